//! Document loading, chunking, and insertion into the vector store.
pub mod chunker;
pub mod core;
pub mod loader;

use thiserror::Error;

use crate::embedder::EmbedderError;
use loader::LoaderError;

/// Errors raised while turning files into stored chunks.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedderError),

    #[error("vector store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("failed to walk {path}: {message}")]
    Walk { path: String, message: String },
}
