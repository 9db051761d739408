use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub position: usize,
    pub content: &'a str,
}

/// A stored document as listed from the index.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub doc_id: String,
    pub filename: String,
    pub metadata: Map<String, Value>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
}
