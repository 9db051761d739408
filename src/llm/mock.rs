/// Scripted language model for tests and dry runs.
///
/// Replies are served from a queue, then from an optional fixed reply.
/// Every request is recorded so callers can assert on prompts.
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CompletionRequest, LanguageModel, LlmError};

pub struct ScriptedLlm {
    queue: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    /// Answer every request with `reply`.
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Some(reply.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer requests in order; `Err` entries fail that call. Once the
    /// script runs out every call fails.
    pub fn sequence(replies: Vec<Result<String, String>>) -> Self {
        Self {
            queue: Mutex::new(replies.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request);
        }

        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match (next, &self.fallback) {
            (Some(Ok(reply)), _) => Ok(reply),
            (Some(Err(message)), _) => Err(LlmError::Other(message)),
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(LlmError::Other("no scripted reply left".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
