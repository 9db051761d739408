use crate::db::Db;
use crate::db::models::Chunk as DbChunk;
use crate::embedder::{self, Embedder};
use crate::indexer::IndexError;
use crate::indexer::chunker::chunk_text;
use crate::indexer::loader::{self, Document};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct IndexReport {
    pub files: usize,
    pub documents: usize,
    pub chunks: usize,
    pub failed: usize,
}

pub struct Indexer {
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: Arc<dyn Embedder>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Index version the inserted rows are written at.
    pub version: u64,
}

impl Indexer {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            db,
            embedder,
            chunk_size,
            chunk_overlap,
            version: 1,
        }
    }

    #[must_use]
    pub fn at_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Chunk, embed, and store one document. Returns the number of chunks.
    pub async fn insert_document(&self, doc: &Document) -> Result<usize, IndexError> {
        let chunks = chunk_text(&doc.text, self.chunk_size, self.chunk_overlap);
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder::embed_batch_blocking(self.embedder.clone(), texts).await?;

        let db_chunks: Vec<DbChunk> = chunks
            .iter()
            .map(|c| DbChunk {
                position: c.position,
                content: c.content.as_str(),
            })
            .collect();

        {
            let mut db_guard = self.db.lock().await;
            db_guard.insert_document(
                &doc.doc_id,
                self.version,
                doc.filename(),
                &doc.metadata,
                &db_chunks,
                &vectors,
            )?;
        }

        debug!(
            doc_id = %doc.doc_id,
            version = self.version,
            chunks = chunks.len(),
            "Inserted document"
        );
        Ok(chunks.len())
    }

    /// Load and insert files one by one, stopping at the first failure.
    ///
    /// Documents inserted before the failure stay in the store.
    pub async fn index_files(&self, paths: &[PathBuf]) -> Result<IndexReport, IndexError> {
        let mut report = IndexReport::default();

        for path in paths {
            let documents = loader::load_file(path)?;
            for doc in &documents {
                report.chunks += self.insert_document(doc).await?;
            }
            report.files += 1;
            report.documents += documents.len();
        }

        Ok(report)
    }

    /// Index every file under `dir` whose name passes the extension allow-list.
    ///
    /// Unlike [`Self::index_files`], a file that fails to load or index is
    /// logged and counted, and the walk continues.
    pub async fn index_directory<P: AsRef<Path>>(
        &self,
        dir: P,
        allowed_extensions: &[String],
    ) -> Result<IndexReport, IndexError> {
        let dir = dir.as_ref();
        let mut report = IndexReport::default();

        if !dir.exists() {
            return Ok(report);
        }

        let walker = WalkBuilder::new(dir).hidden(false).build();

        for entry in walker {
            let entry = entry.map_err(|e| IndexError::Walk {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            if !loader::has_allowed_extension(&name, allowed_extensions) {
                continue;
            }

            match self.index_files(&[path.to_path_buf()]).await {
                Ok(r) => {
                    report.files += r.files;
                    report.documents += r.documents;
                    report.chunks += r.chunks;
                }
                Err(e) => {
                    warn!("Failed to index {}: {e}", path.display());
                    report.failed += 1;
                }
            }
        }

        info!(
            "Indexed {} files ({} documents, {} chunks) from {}, {} failed",
            report.files,
            report.documents,
            report.chunks,
            dir.display(),
            report.failed
        );
        Ok(report)
    }
}
