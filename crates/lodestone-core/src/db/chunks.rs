//! Chunk storage with synchronized full-text rows
//!
//! A chunk and its FTS mirror are written in one transaction; readers
//! never observe one without the other.

use super::Database;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

/// Chunk payload produced by the indexer
#[derive(Debug, Clone)]
pub struct ChunkInput {
    pub id: String,
    pub chunk_index: i64,
    pub section_title: Option<String>,
    pub content: String,
    pub token_count: Option<i64>,
}

/// Chunk joined with its document context, as fetched for retrieval
#[derive(Debug, Clone)]
pub struct ChunkDetails {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub section_title: Option<String>,
    pub content: String,
    pub source_name: String,
    pub workspace_id: String,
    pub document_indexed_at: DateTime<Utc>,
}

impl Database {
    /// Replace all chunks of a document, mirroring into the FTS index
    /// within the same transaction.
    pub fn replace_document_chunks(
        &self,
        document_id: &str,
        source_name: &str,
        chunks: &[ChunkInput],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM chunks_fts WHERE chunk_id IN
             (SELECT id FROM chunks WHERE document_id = ?1)",
            params![document_id],
        )?;
        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id],
        )?;

        {
            let mut insert_chunk = tx.prepare(
                "INSERT INTO chunks (id, document_id, chunk_index, section_title, content, token_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            let mut insert_fts = tx.prepare(
                "INSERT INTO chunks_fts (chunk_id, content, section_title, source_name)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let created = now.to_rfc3339();
            for chunk in chunks {
                insert_chunk.execute(params![
                    chunk.id,
                    document_id,
                    chunk.chunk_index,
                    chunk.section_title,
                    chunk.content,
                    chunk.token_count,
                    created,
                ])?;
                insert_fts.execute(params![
                    chunk.id,
                    chunk.content,
                    chunk.section_title,
                    source_name,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Fetch chunk details for the given ids, preserving no particular order
    pub fn get_chunk_details(&self, chunk_ids: &[String]) -> Result<Vec<ChunkDetails>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; chunk_ids.len()].join(",");
        let sql = format!(
            "SELECT c.id, c.document_id, c.chunk_index, c.section_title, c.content,
                    d.source_name, d.workspace_id, d.indexed_at
             FROM chunks c
             JOIN documents d ON d.id = c.document_id
             WHERE c.id IN ({})",
            placeholders
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(chunk_ids.iter()), |row| {
                let indexed_at: String = row.get(7)?;
                Ok(ChunkDetails {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    chunk_index: row.get(2)?,
                    section_title: row.get(3)?,
                    content: row.get(4)?,
                    source_name: row.get(5)?,
                    workspace_id: row.get(6)?,
                    document_indexed_at: DateTime::parse_from_rfc3339(&indexed_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of chunks attached to a document
    pub fn count_document_chunks(&self, document_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Every chunk must have exactly one FTS row and vice versa
    pub fn verify_lexical_consistency(&self) -> Result<bool> {
        let orphan_chunks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks
             WHERE id NOT IN (SELECT chunk_id FROM chunks_fts)",
            [],
            |row| row.get(0),
        )?;
        let orphan_fts: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks_fts
             WHERE chunk_id NOT IN (SELECT id FROM chunks)",
            [],
            |row| row.get(0),
        )?;
        Ok(orphan_chunks == 0 && orphan_fts == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentInsert, GLOBAL_WORKSPACE};

    fn seed_document(db: &Database, id: &str, hash: &str) {
        db.insert_document(
            &DocumentInsert {
                id,
                workspace_id: GLOBAL_WORKSPACE,
                artifact_entry_id: None,
                source_type: "artifact",
                source_name: "seed",
                source_path: None,
                content_hash: hash,
                file_size: None,
            },
            Utc::now(),
        )
        .unwrap();
    }

    fn chunk(id: &str, index: i64, content: &str) -> ChunkInput {
        ChunkInput {
            id: id.to_string(),
            chunk_index: index,
            section_title: None,
            content: content.to_string(),
            token_count: None,
        }
    }

    #[test]
    fn test_replace_chunks_keeps_fts_in_sync() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        seed_document(&db, "doc-1", "h1");

        db.replace_document_chunks(
            "doc-1",
            "seed",
            &[chunk("c1", 0, "alpha beta"), chunk("c2", 1, "gamma delta")],
            Utc::now(),
        )
        .unwrap();
        assert!(db.verify_lexical_consistency().unwrap());
        assert_eq!(db.count_document_chunks("doc-1").unwrap(), 2);

        // Replacing drops the old rows on both sides
        db.replace_document_chunks("doc-1", "seed", &[chunk("c3", 0, "epsilon")], Utc::now())
            .unwrap();
        assert!(db.verify_lexical_consistency().unwrap());
        assert_eq!(db.count_document_chunks("doc-1").unwrap(), 1);
    }

    #[test]
    fn test_document_delete_cascades_to_fts() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        seed_document(&db, "doc-1", "h1");
        db.replace_document_chunks("doc-1", "seed", &[chunk("c1", 0, "alpha")], Utc::now())
            .unwrap();

        db.delete_document("doc-1").unwrap();
        assert!(db.verify_lexical_consistency().unwrap());

        let fts_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM chunks_fts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fts_count, 0);
    }

    #[test]
    fn test_get_chunk_details_joins_document() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        seed_document(&db, "doc-1", "h1");
        db.replace_document_chunks(
            "doc-1",
            "seed",
            &[ChunkInput {
                id: "c1".to_string(),
                chunk_index: 0,
                section_title: Some("Intro".to_string()),
                content: "alpha".to_string(),
                token_count: Some(1),
            }],
            Utc::now(),
        )
        .unwrap();

        let details = db.get_chunk_details(&["c1".to_string()]).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].source_name, "seed");
        assert_eq!(details[0].workspace_id, GLOBAL_WORKSPACE);
        assert_eq!(details[0].section_title.as_deref(), Some("Intro"));
    }
}
