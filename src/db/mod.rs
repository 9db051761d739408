//! Vector store backing the document index, using SQLite and sqlite-vec
use rusqlite::{Connection, Result};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use tracing::info;

pub mod documents;
pub mod models;
pub mod search;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    filename TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    indexed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (doc_id, version)
);

CREATE INDEX IF NOT EXISTS idx_doc_filename ON documents(filename);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    content TEXT NOT NULL,
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_document_id ON chunks(document_id);
"#;

/// Index version that sees every row written so far, committed or not.
pub const LATEST: u64 = i64::MAX as u64;

/// Filter on `documents d`: the row was written at or before `:version` and
/// no later write of the same `doc_id` at or before `:version` replaced it.
const VISIBLE_AT: &str = "d.version <= :version AND NOT EXISTS (
    SELECT 1 FROM documents n
    WHERE n.doc_id = d.doc_id AND n.version > d.version AND n.version <= :version
)";

/// SQLite integers are signed; [`LATEST`] and anything above clamp to `i64::MAX`.
fn sql_version(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection initialized with sqlite-vec and the index schema.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Db {
    /// Open a database at the given path and initialize the schema for
    /// vectors of `dimensions` floats.
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing vector store: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, dimensions)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(embedding FLOAT[{dimensions}]);"
        ))?;

        Ok(Self { conn, dimensions })
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Highest version any document row was written at (1 for an empty store).
    pub fn max_version(&self) -> Result<u64> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(version) FROM documents", [], |row| row.get(0))?;
        Ok(max.map_or(1, |v| v.max(1) as u64))
    }

    /// Delete document rows (with their chunks and vectors) that a later
    /// write at or before `version` has replaced. Returns the number of
    /// document rows removed.
    pub fn prune_superseded(&mut self, version: u64) -> Result<usize> {
        let superseded = "SELECT o.id FROM documents o WHERE EXISTS (
                SELECT 1 FROM documents n
                WHERE n.doc_id = o.doc_id AND n.version > o.version AND n.version <= ?1
            )";
        let version = sql_version(version);

        let tx = self.conn.transaction()?;
        tx.execute(
            &format!(
                "DELETE FROM vec_chunks WHERE rowid IN \
                 (SELECT id FROM chunks WHERE document_id IN ({superseded}))"
            ),
            [version],
        )?;
        tx.execute(
            &format!("DELETE FROM chunks WHERE document_id IN ({superseded})"),
            [version],
        )?;
        let removed = tx.execute(
            &format!("DELETE FROM documents WHERE id IN ({superseded})"),
            [version],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    /// Flush the write-ahead log (if any) into the main database file.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
    }
}

/// Serialize a float32 vector into the little-endian blob vec0 expects.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        return bytemuck::cast_slice::<f32, u8>(vec).to_vec();
    }
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}
