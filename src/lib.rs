//! # docrag — document question answering over a local vector index
//!
//! Ingests `.txt` and `.pdf` files into a SQLite + sqlite-vec index, answers
//! questions over HTTP with retrieved context and a hosted chat model, and
//! ships offline tools to build and score an evaluation set.
//!
//! ## Architecture
//!
//! - **[`config`]** — JSON configuration with defaults, validation, API key lookup
//! - **[`db`]** — SQLite + sqlite-vec vector store (documents, chunks, search)
//! - **[`embedder`]** — Text embedding via ONNX Runtime (bge-small-en-v1.5)
//! - **[`indexer`]** — File loading, chunking, and insertion into the store
//! - **[`llm`]** — Chat-completion client behind the [`llm::LanguageModel`] trait
//! - **[`engine`]** — Retrieval, answer synthesis, and the versioned index manager
//! - **[`server`]** — axum HTTP service (chat page, ingest, query)
//! - **[`eval`]** — Keyword extraction and the evaluation harness

pub mod config;
pub mod db;
pub mod embedder;
pub mod engine;
pub mod eval;
pub mod indexer;
pub mod llm;
pub mod server;
