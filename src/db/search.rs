use super::{Db, LATEST, VISIBLE_AT, serialize_vector, sql_version};
use rusqlite::{Result, named_params};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub doc_id: String,
    pub filename: String,
    pub metadata: Map<String, Value>,
    pub chunk_content: String,
    pub similarity: f64,
    pub position: usize,
    pub chunk_id: i64,
}

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResult> {
    let distance: f64 = row.get(6)?;
    let similarity = 1.0 - distance;
    let raw_metadata: String = row.get(2)?;

    Ok(SearchResult {
        doc_id: row.get(0)?,
        filename: row.get(1)?,
        metadata: serde_json::from_str(&raw_metadata).unwrap_or_default(),
        chunk_content: row.get(3)?,
        position: row.get::<_, i64>(4)? as usize,
        chunk_id: row.get(5)?,
        similarity,
    })
}

impl Db {
    /// Cosine similarity search over the documents visible at `version`.
    ///
    /// Results are ordered by descending similarity (`1 - cosine distance`).
    pub fn search_at(
        &self,
        query_vector: &[f32],
        top_k: usize,
        version: u64,
    ) -> Result<Vec<SearchResult>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT
                d.doc_id,
                d.filename,
                d.metadata,
                c.content,
                c.position,
                c.id as chunk_id,
                vec_distance_cosine(v.embedding, :query) as distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            JOIN documents d ON c.document_id = d.id
            WHERE {VISIBLE_AT}
            ORDER BY distance ASC
            LIMIT :top_k
            "#
        ))?;

        let rows = stmt.query_map(
            named_params! {
                ":query": serialize_vector(query_vector),
                ":top_k": top_k as i64,
                ":version": sql_version(version),
            },
            map_search_row,
        )?;

        rows.collect()
    }

    /// Search everything written so far, pending ingests included.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        self.search_at(query_vector, top_k, LATEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Chunk;

    fn padded(head: &[f32]) -> Vec<f32> {
        let mut v = vec![0.0f32; 8];
        v[..head.len()].copy_from_slice(head);
        v
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let mut db = Db::open_in_memory(8).unwrap();

        let mut meta_a = Map::new();
        meta_a.insert("filename".into(), Value::from("data/rust.txt"));
        db.insert_document(
            "data/rust.txt",
            1,
            "data/rust.txt",
            &meta_a,
            &[Chunk {
                position: 0,
                content: "Rust programming language",
            }],
            &[padded(&[0.1, 0.2, 0.3])],
        )
        .unwrap();

        let mut meta_b = Map::new();
        meta_b.insert("filename".into(), Value::from("data/report.pdf"));
        meta_b.insert("page_label".into(), Value::from("1"));
        db.insert_document(
            "data/report.pdf#page=1",
            1,
            "data/report.pdf",
            &meta_b,
            &[Chunk {
                position: 0,
                content: "Quarterly revenue",
            }],
            &[padded(&[0.9, -0.8, 0.1])],
        )
        .unwrap();

        let results = db.search(&padded(&[0.1, 0.2, 0.3]), 5).unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].filename, "data/rust.txt");
        assert!(results[0].similarity > 0.99);
        assert!(results[0].similarity >= results[1].similarity);

        assert_eq!(results[1].doc_id, "data/report.pdf#page=1");
        assert_eq!(results[1].metadata["page_label"], "1");
    }

    #[test]
    fn test_search_respects_top_k() {
        let mut db = Db::open_in_memory(8).unwrap();
        for i in 0..4 {
            let name = format!("data/{i}.txt");
            db.insert_document(
                &name,
                1,
                &name,
                &Map::new(),
                &[Chunk {
                    position: 0,
                    content: "text",
                }],
                &[padded(&[1.0, i as f32])],
            )
            .unwrap();
        }

        assert_eq!(db.search(&padded(&[1.0]), 2).unwrap().len(), 2);
    }

    #[test]
    fn test_search_empty_store() {
        let db = Db::open_in_memory(8).unwrap();
        assert!(db.search(&padded(&[1.0]), 3).unwrap().is_empty());
    }

    #[test]
    fn test_search_at_hides_later_versions() {
        let mut db = Db::open_in_memory(8).unwrap();
        let chunk = [Chunk {
            position: 0,
            content: "Quarterly revenue",
        }];
        db.insert_document("data/a.txt", 1, "data/a.txt", &Map::new(), &chunk, &[padded(&[1.0])])
            .unwrap();
        db.insert_document("data/b.txt", 2, "data/b.txt", &Map::new(), &chunk, &[padded(&[1.0, 0.1])])
            .unwrap();

        let at_one = db.search_at(&padded(&[1.0]), 5, 1).unwrap();
        assert_eq!(at_one.len(), 1);
        assert_eq!(at_one[0].doc_id, "data/a.txt");
        assert_eq!(db.search_at(&padded(&[1.0]), 5, 2).unwrap().len(), 2);
        assert_eq!(db.search(&padded(&[1.0]), 5).unwrap().len(), 2);
    }

    #[test]
    fn test_search_at_returns_replaced_content_per_version() {
        let mut db = Db::open_in_memory(8).unwrap();
        let old = [Chunk {
            position: 0,
            content: "First draft",
        }];
        let new = [Chunk {
            position: 0,
            content: "Second draft",
        }];
        db.insert_document("data/n.txt", 1, "data/n.txt", &Map::new(), &old, &[padded(&[1.0])])
            .unwrap();
        db.insert_document("data/n.txt", 2, "data/n.txt", &Map::new(), &new, &[padded(&[1.0])])
            .unwrap();

        let v1 = db.search_at(&padded(&[1.0]), 5, 1).unwrap();
        let v2 = db.search_at(&padded(&[1.0]), 5, 2).unwrap();
        assert_eq!(v1.len(), 1);
        assert_eq!(v1[0].chunk_content, "First draft");
        assert_eq!(v2.len(), 1);
        assert_eq!(v2[0].chunk_content, "Second draft");
    }
}
