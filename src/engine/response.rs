use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::search::SearchResult;

/// Characters of chunk text exposed per source.
pub const SOURCE_SNIPPET_CHARS: usize = 500;

/// A retrieved chunk with its similarity score and document metadata.
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub text: String,
    pub score: Option<f64>,
    pub metadata: Map<String, Value>,
}

impl SourceNode {
    /// The `filename` metadata entry, or `""` when absent.
    #[must_use]
    pub fn filename(&self) -> &str {
        self.metadata
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

impl From<SearchResult> for SourceNode {
    fn from(r: SearchResult) -> Self {
        let mut metadata = r.metadata;
        if !metadata.contains_key("filename") && !r.filename.is_empty() {
            metadata.insert("filename".to_string(), Value::from(r.filename));
        }
        Self {
            text: r.chunk_content,
            score: r.similarity.is_finite().then_some(r.similarity),
            metadata,
        }
    }
}

/// Answer plus the chunks it was synthesized from.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub answer: String,
    pub source_nodes: Vec<SourceNode>,
}

impl QueryResponse {
    /// Source list as exposed over HTTP.
    pub fn sources(&self) -> Vec<Source> {
        self.source_nodes.iter().map(Source::from_node).collect()
    }
}

/// Wire form of a retrieved source.
///
/// Every field defaults when absent, so partial payloads still decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Source {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Source {
    pub fn from_node(node: &SourceNode) -> Self {
        Self {
            text: truncate_chars(&node.text, SOURCE_SNIPPET_CHARS),
            score: node.score,
            filename: node.filename().to_string(),
            metadata: node.metadata.clone(),
        }
    }
}

/// `GET /query` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub results: String,
}

/// `GET /query_with_context` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryWithContext {
    pub query: String,
    pub answer: String,
    pub sources: Vec<Source>,
}

/// First `max` characters of `text` (char-boundary safe).
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
