use super::{Db, VISIBLE_AT, models::*, serialize_vector, sql_version};
use rusqlite::{Result, named_params, params};
use serde_json::{Map, Value};

fn parse_metadata(raw: &str) -> Map<String, Value> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl Db {
    /// Documents visible at `version` with their chunk counts, ordered by
    /// insertion.
    pub fn list_documents_at(&self, version: u64) -> Result<Vec<StoredDocument>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT d.doc_id, d.filename, d.metadata, COUNT(c.id)
            FROM documents d
            LEFT JOIN chunks c ON c.document_id = d.id
            WHERE {VISIBLE_AT}
            GROUP BY d.id
            ORDER BY d.id
            "#
        ))?;
        let rows = stmt.query_map(named_params! { ":version": sql_version(version) }, |row| {
            let raw: String = row.get(2)?;
            Ok(StoredDocument {
                doc_id: row.get(0)?,
                filename: row.get(1)?,
                metadata: parse_metadata(&raw),
                chunk_count: row.get::<_, i64>(3)? as usize,
            })
        })?;

        rows.collect()
    }

    /// Every document written so far, pending ingests included.
    pub fn list_documents(&self) -> Result<Vec<StoredDocument>> {
        self.list_documents_at(super::LATEST)
    }

    /// Document and chunk totals visible at `version`.
    pub fn stats_at(&self, version: u64) -> Result<StoreStats> {
        let (documents, chunks): (i64, i64) = self.conn.query_row(
            &format!(
                r#"
                SELECT COUNT(*), COALESCE(SUM(
                    (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id)
                ), 0)
                FROM documents d
                WHERE {VISIBLE_AT}
                "#
            ),
            named_params! { ":version": sql_version(version) },
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(StoreStats {
            documents: documents as usize,
            chunks: chunks as usize,
        })
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.stats_at(super::LATEST)
    }

    /// Inserts a document with its chunks and embeddings, written at index
    /// `version`.
    ///
    /// Re-inserting a `doc_id` at the same version replaces its chunks and
    /// metadata. Inserting it at a newer version adds a row that shadows the
    /// older one for readers at that version and later.
    pub fn insert_document(
        &mut self,
        doc_id: &str,
        version: u64,
        filename: &str,
        metadata: &Map<String, Value>,
        chunks: &[Chunk<'_>],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        assert_eq!(
            chunks.len(),
            embeddings.len(),
            "chunks and embeddings length mismatch"
        );

        let metadata_json =
            serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string());

        let tx = self.conn.transaction()?;

        let id: i64 = tx.query_row(
            r#"
            INSERT INTO documents (doc_id, version, filename, metadata, indexed_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(doc_id, version) DO UPDATE SET
                filename = excluded.filename,
                metadata = excluded.metadata,
                indexed_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![doc_id, sql_version(version), filename, metadata_json],
            |row| row.get(0),
        )?;

        // Same-version re-insert
        tx.execute(
            "DELETE FROM vec_chunks WHERE rowid IN (SELECT id FROM chunks WHERE document_id = ?)",
            params![id],
        )?;
        tx.execute("DELETE FROM chunks WHERE document_id = ?", params![id])?;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            tx.execute(
                "INSERT INTO chunks (document_id, position, content) VALUES (?, ?, ?)",
                params![id, chunk.position as i64, chunk.content],
            )?;
            let chunk_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                params![chunk_id, serialize_vector(embedding)],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
