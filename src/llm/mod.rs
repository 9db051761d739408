/// Hosted language model access.
///
/// The query engine and the keyword extractor talk to a chat-completion
/// model through [`LanguageModel`], so tests can swap in [`mock::ScriptedLlm`].
pub mod mock;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::{LlmConfig, load_api_key};

/// Errors that can occur while calling a language model.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A single non-streaming completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// A request holding one user message.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            temperature: None,
            max_tokens: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a completion and return the assistant's text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Build the hosted model client from configuration, resolving the API key.
pub fn from_config(cfg: &LlmConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let api_key = load_api_key(cfg)?;
    let client = openai::OpenAiClient::new(cfg, api_key)?;
    info!("Using language model {} at {}", cfg.model, cfg.base_url);
    Ok(Arc::new(client))
}
