//! Query engine: retrieval over the vector store plus answer synthesis.
//!
//! - **[`manager`]** — owns the store and the current engine version; builds,
//!   reloads, persists, and swaps engines after ingest
//! - **[`response`]** — answer and source types shared with the HTTP layer
//!   and the evaluation harness
//! - **[`synthesizer`]** — turns retrieved chunks into one answer
pub mod manager;
pub mod response;
pub mod synthesizer;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use tracing::debug;

use crate::config::{IndexConfig, ResponseMode};
use crate::db::Db;
use crate::embedder::{self, Embedder, EmbedderError};
use crate::llm::{LanguageModel, LlmError};
use response::{QueryResponse, SourceNode};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedderError),

    #[error("retrieval failed: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("language model call failed: {0}")]
    Llm(#[from] LlmError),
}

/// Retrieval and synthesis knobs, copied out of [`IndexConfig`].
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub top_k: usize,
    pub response_mode: ResponseMode,
    pub context_window_chars: usize,
}

impl From<&IndexConfig> for EngineSettings {
    fn from(cfg: &IndexConfig) -> Self {
        Self {
            top_k: cfg.top_k,
            response_mode: cfg.response_mode,
            context_window_chars: cfg.context_window_chars,
        }
    }
}

/// One immutable version of the queryable index.
pub struct QueryEngine {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    settings: EngineSettings,
    version: u64,
}

impl QueryEngine {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        settings: EngineSettings,
        version: u64,
    ) -> Self {
        Self {
            db,
            embedder,
            llm,
            settings,
            version,
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Top-k chunks for `query` among the documents committed at this
    /// engine's version, most similar first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SourceNode>, EngineError> {
        let query_vector = embedder::embed_blocking(self.embedder.clone(), query.to_string()).await?;
        let results = {
            let db = self.db.lock().await;
            db.search_at(&query_vector, self.settings.top_k, self.version)?
        };

        Ok(results.into_iter().map(SourceNode::from).collect())
    }

    /// Retrieve context for `query` and synthesize an answer from it.
    pub async fn query(&self, query: &str) -> Result<QueryResponse, EngineError> {
        let source_nodes = self.retrieve(query).await?;
        debug!(
            version = self.version,
            retrieved = source_nodes.len(),
            model = self.llm.model_name(),
            "Retrieved context for query"
        );

        let texts: Vec<String> = source_nodes.iter().map(|n| n.text.clone()).collect();
        let answer = synthesizer::synthesize(
            self.llm.as_ref(),
            self.settings.response_mode,
            query,
            &texts,
            self.settings.context_window_chars,
        )
        .await?;

        Ok(QueryResponse {
            answer,
            source_nodes,
        })
    }
}
