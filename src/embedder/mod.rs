/// Embedder trait and shared types for text embedding.
pub mod download;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::{EmbedderConfig, EmbedderProvider};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// [`Embedder::embed`] on tokio's blocking pool.
pub async fn embed_blocking(embedder: Arc<dyn Embedder>, text: String) -> Result<Vec<f32>, EmbedderError> {
    tokio::task::spawn_blocking(move || embedder.embed(&text))
        .await
        .map_err(|e| EmbedderError::InferenceFailed(format!("embedding task failed: {e}")))?
}

/// [`Embedder::embed_batch`] on tokio's blocking pool.
pub async fn embed_batch_blocking(
    embedder: Arc<dyn Embedder>,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>, EmbedderError> {
    tokio::task::spawn_blocking(move || {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        embedder.embed_batch(&refs)
    })
    .await
    .map_err(|e| EmbedderError::InferenceFailed(format!("embedding task failed: {e}")))?
}

/// Build the embedder selected in configuration.
///
/// The ONNX provider downloads its model files on first use.
pub fn from_config(cfg: &EmbedderConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match cfg.provider {
        EmbedderProvider::Mock => {
            info!("Using mock embedder ({} dims)", cfg.dimensions);
            Ok(Arc::new(mock::MockEmbedder::new(cfg.dimensions)))
        }
        EmbedderProvider::Onnx => {
            let model_dir = Path::new(&cfg.model_dir);
            download::ensure_model(model_dir, &cfg.model_repo)?;
            let embedder = onnx::OnnxEmbedder::new(model_dir)?;
            anyhow::ensure!(
                embedder.dimensions() == cfg.dimensions,
                "embedder.dimensions is {} but the model produces {}",
                cfg.dimensions,
                embedder.dimensions()
            );
            Ok(Arc::new(embedder))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;

    #[tokio::test]
    async fn test_blocking_helpers_match_direct_calls() {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(16));
        let direct = embedder.embed("annual budget").unwrap();

        let single = embed_blocking(embedder.clone(), "annual budget".into()).await.unwrap();
        let batch = embed_batch_blocking(embedder, vec!["penguins".into(), "annual budget".into()])
            .await
            .unwrap();

        assert_eq!(single, direct);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], direct);
    }
}
