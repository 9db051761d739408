//! Turns files on disk into documents for the index.
//!
//! Text files become one document each. PDFs become one document per page,
//! labelled with `page_label` the way page-level readers usually do.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PDF {}: {message}", path.display())]
    Pdf { path: PathBuf, message: String },
}

/// A unit of text with the metadata that travels with every chunk cut from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl Document {
    /// The `filename` metadata entry, or `""` when absent.
    #[must_use]
    pub fn filename(&self) -> &str {
        self.metadata
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Whether `filename` ends with one of `allowed` (e.g. `".pdf"`), ignoring case.
#[must_use]
pub fn has_allowed_extension(filename: &str, allowed: &[String]) -> bool {
    let lower = filename.to_lowercase();
    allowed
        .iter()
        .any(|ext| !ext.is_empty() && lower.ends_with(&ext.to_lowercase()))
}

/// Path as stored in metadata, with forward slashes on every platform.
fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn base_metadata(filename: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("filename".to_string(), Value::from(filename));
    metadata
}

/// Load a file into one or more documents.
///
/// `.pdf` files are parsed page by page; anything else is read as UTF-8 text
/// (invalid sequences are replaced). Blank documents are dropped.
pub fn load_file(path: &Path) -> Result<Vec<Document>, LoaderError> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        load_pdf(path)
    } else {
        load_text(path)
    }
}

fn load_text(path: &Path) -> Result<Vec<Document>, LoaderError> {
    let bytes = fs::read(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let filename = display_path(path);
    Ok(vec![Document {
        doc_id: filename.clone(),
        metadata: base_metadata(&filename),
        text,
    }])
}

fn load_pdf(path: &Path) -> Result<Vec<Document>, LoaderError> {
    let doc = lopdf::Document::load(path).map_err(|e| LoaderError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let filename = display_path(path);
    let mut page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    let mut documents = Vec::with_capacity(page_numbers.len());
    for page_number in page_numbers {
        // Pages without a text layer yield nothing rather than failing the file
        let raw = doc.extract_text(&[page_number]).unwrap_or_default();
        let text = normalize_text(&raw);
        if text.is_empty() {
            continue;
        }

        let mut metadata = base_metadata(&filename);
        metadata.insert(
            "page_label".to_string(),
            Value::from(page_number.to_string()),
        );
        documents.push(Document {
            doc_id: format!("{filename}#page={page_number}"),
            text,
            metadata,
        });
    }

    Ok(documents)
}

/// Collapse runs of horizontal whitespace and excess blank lines.
fn normalize_text(raw: &str) -> String {
    static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\f]+").unwrap());
    static LINE_EDGES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" *\n *").unwrap());
    static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

    let collapsed = SPACES.replace_all(raw, " ");
    let lines = LINE_EDGES.replace_all(&collapsed, "\n");
    BLANK_LINES.replace_all(&lines, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_allowed_extension() {
        let allowed = vec![".txt".to_string(), ".pdf".to_string()];
        assert!(has_allowed_extension("notes.txt", &allowed));
        assert!(has_allowed_extension("Report_2023.PDF", &allowed));
        assert!(!has_allowed_extension("image.png", &allowed));
        assert!(!has_allowed_extension("", &allowed));
        assert!(!has_allowed_extension("txt", &allowed));
    }

    #[test]
    fn test_load_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "Some notes about budgets.").unwrap();

        let docs = load_file(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "Some notes about budgets.");
        assert!(docs[0].filename().ends_with("notes.txt"));
        assert_eq!(docs[0].doc_id, docs[0].filename());
    }

    #[test]
    fn test_load_blank_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.txt");
        fs::write(&path, "  \n\n ").unwrap();
        assert!(load_file(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_file(Path::new("/nonexistent/docrag/file.txt")).unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }

    #[test]
    fn test_load_invalid_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, "this is not a pdf").unwrap();

        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, LoaderError::Pdf { .. }));
        assert!(err.to_string().contains("broken.pdf"));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(
            normalize_text("  Hello\t\tworld \n\n\n\nNext   page "),
            "Hello world\n\nNext page"
        );
    }
}
