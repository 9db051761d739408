/// Index lifecycle: build or reload at startup, persist, and swap engines.
///
/// The manager owns the store. Queries take a cheap handle to the current
/// [`QueryEngine`], which only reads rows written at or below its version.
/// An ingest holds the ingest lock for its whole duration, writes its rows
/// at the next version, and on commit persists them and installs the engine
/// for that version.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex as TokioMutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use super::{EngineSettings, QueryEngine};
use crate::config::{Config, IndexConfig};
use crate::db::Db;
use crate::db::models::StoreStats;
use crate::embedder::Embedder;
use crate::indexer::IndexError;
use crate::indexer::core::{IndexReport, Indexer};
use crate::llm::LanguageModel;

pub const DB_FILE: &str = "index.db";
pub const META_FILE: &str = "index_meta.json";

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to flush index store: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode index metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contents of `index_meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexMeta {
    pub version: u64,
    pub documents: usize,
    pub chunks: usize,
    pub persisted_at: DateTime<Utc>,
}

/// How the index came to be at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No persist directory existed; the data directory was indexed.
    Built,
    /// The persisted index was opened as-is.
    Reloaded,
}

pub struct IndexManager {
    db: Arc<TokioMutex<Db>>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    index_cfg: IndexConfig,
    persist_dir: PathBuf,
    current: RwLock<Arc<QueryEngine>>,
    ingest_lock: TokioMutex<()>,
    state: IndexState,
}

impl IndexManager {
    /// Reload the persisted index if the persist directory exists, otherwise
    /// build one from every supported file in the data directory.
    pub async fn open(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let persist_dir = config.persist_dir();
        let dimensions = embedder.dimensions();

        let (db, state, version) = if persist_dir.exists() {
            let db = Db::open(persist_dir.join(DB_FILE), dimensions)
                .with_context(|| format!("Failed to open index in {}", persist_dir.display()))?;
            let version = match read_meta(&persist_dir) {
                Some(meta) => meta.version,
                None => {
                    let version = db.max_version().context("Failed to read index version")?;
                    warn!(
                        "No readable {} in {}, resuming at version {version}",
                        META_FILE,
                        persist_dir.display()
                    );
                    version
                }
            };
            (db, IndexState::Reloaded, version)
        } else {
            let db = build(config, embedder.clone(), &persist_dir).await?;
            (db, IndexState::Built, 1)
        };

        let stats = db.stats_at(version).context("Failed to read index stats")?;
        info!(
            state = ?state,
            version,
            documents = stats.documents,
            chunks = stats.chunks,
            "Index ready"
        );

        let db = Arc::new(TokioMutex::new(db));
        let engine = QueryEngine::new(
            db.clone(),
            embedder.clone(),
            llm.clone(),
            EngineSettings::from(&config.index),
            version,
        );

        Ok(Self {
            db,
            embedder,
            llm,
            index_cfg: config.index.clone(),
            persist_dir,
            current: RwLock::new(Arc::new(engine)),
            ingest_lock: TokioMutex::new(()),
            state,
        })
    }

    #[must_use]
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// Handle to the engine version current at the time of the call.
    pub async fn engine(&self) -> Arc<QueryEngine> {
        self.current.read().await.clone()
    }

    /// Totals visible to the current engine version.
    pub async fn stats(&self) -> rusqlite::Result<StoreStats> {
        let version = self.engine().await.version();
        self.db.lock().await.stats_at(version)
    }

    /// Wait for any running ingest to finish and start a new one.
    pub async fn begin_ingest(&self) -> IngestSession<'_> {
        let guard = self.ingest_lock.lock().await;
        // Stable while the ingest lock is held: only commit() bumps it.
        let version = self.engine().await.version() + 1;
        IngestSession {
            manager: self,
            version,
            _guard: guard,
        }
    }
}

/// Exclusive access to the index for one ingest.
///
/// Rows written through the session stay invisible to every engine handed
/// out so far; [`IngestSession::commit`] publishes them.
pub struct IngestSession<'a> {
    manager: &'a IndexManager,
    version: u64,
    _guard: MutexGuard<'a, ()>,
}

impl IngestSession<'_> {
    /// Version this session writes at and commits as.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Insert `paths` one by one; stops at the first failure.
    pub async fn index_files(&self, paths: &[PathBuf]) -> Result<IndexReport, IndexError> {
        let m = self.manager;
        let indexer = Indexer::new(
            m.db.clone(),
            m.embedder.clone(),
            m.index_cfg.chunk_size,
            m.index_cfg.chunk_overlap,
        )
        .at_version(self.version);
        indexer.index_files(paths).await
    }

    /// Persist the store and install the engine for this session's version.
    pub async fn commit(&self) -> Result<u64, PersistError> {
        let m = self.manager;
        let version = self.version;

        {
            let mut db = m.db.lock().await;
            persist(&db, &m.persist_dir, version)?;
            // Handles on the previous version may still be answering queries.
            let pruned = db.prune_superseded(version.saturating_sub(1))?;
            if pruned > 0 {
                debug!(pruned, "Dropped superseded document rows");
            }
        }

        let engine = QueryEngine::new(
            m.db.clone(),
            m.embedder.clone(),
            m.llm.clone(),
            EngineSettings::from(&m.index_cfg),
            version,
        );
        *m.current.write().await = Arc::new(engine);

        info!(version, "Query engine swapped");
        Ok(version)
    }
}

/// Index the data directory into a scratch directory, persist it, then move
/// it into place so an interrupted build never looks like a finished one.
async fn build(config: &Config, embedder: Arc<dyn Embedder>, persist_dir: &Path) -> Result<Db> {
    let data_dir = config.data_dir();
    let scratch = scratch_dir(persist_dir);
    info!(
        "Building index from {} into {}",
        data_dir.display(),
        persist_dir.display()
    );

    if scratch.exists() {
        fs::remove_dir_all(&scratch)
            .with_context(|| format!("Failed to clear {}", scratch.display()))?;
    }
    fs::create_dir_all(&scratch)
        .with_context(|| format!("Failed to create {}", scratch.display()))?;
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let dimensions = embedder.dimensions();
    {
        let db = Db::open(scratch.join(DB_FILE), dimensions).context("Failed to create index store")?;
        let db = Arc::new(TokioMutex::new(db));
        let indexer = Indexer::new(
            db.clone(),
            embedder,
            config.index.chunk_size,
            config.index.chunk_overlap,
        );
        let report = indexer
            .index_directory(&data_dir, &config.server.allowed_extensions)
            .await
            .context("Failed to index data directory")?;
        info!(
            files = report.files,
            documents = report.documents,
            chunks = report.chunks,
            failed = report.failed,
            "Initial indexing finished"
        );

        let db = db.lock().await;
        persist(&db, &scratch, 1).context("Failed to persist initial index")?;
    }

    fs::rename(&scratch, persist_dir).with_context(|| {
        format!(
            "Failed to move {} to {}",
            scratch.display(),
            persist_dir.display()
        )
    })?;

    Db::open(persist_dir.join(DB_FILE), dimensions).context("Failed to reopen index")
}

fn scratch_dir(persist_dir: &Path) -> PathBuf {
    let mut name = persist_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "storage".into());
    name.push(".building");
    persist_dir.with_file_name(name)
}

/// Flush the store and record `version` in the metadata file.
pub fn persist(db: &Db, dir: &Path, version: u64) -> Result<IndexMeta, PersistError> {
    db.checkpoint()?;
    let stats = db.stats_at(version)?;
    let meta = IndexMeta {
        version,
        documents: stats.documents,
        chunks: stats.chunks,
        persisted_at: Utc::now(),
    };

    let json = serde_json::to_string_pretty(&meta)?;
    let path = dir.join(META_FILE);
    let tmp = dir.join(format!("{META_FILE}.tmp"));
    fs::write(&tmp, json).map_err(|source| PersistError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, &path).map_err(|source| PersistError::Io {
        path: path.clone(),
        source,
    })?;

    Ok(meta)
}

pub fn read_meta(dir: &Path) -> Option<IndexMeta> {
    let data = fs::read_to_string(dir.join(META_FILE)).ok()?;
    serde_json::from_str(&data).ok()
}
