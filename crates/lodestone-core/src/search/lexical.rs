//! BM25 full-text search via FTS5
//!
//! The scope predicate is part of the SQL; results are never
//! post-filtered after ranking.

use super::{RankedHit, Scope};
use crate::db::Database;
use crate::error::Result;
use rusqlite::params;

impl Database {
    /// Top `k` lexical hits for a sanitized-on-entry query under a scope.
    ///
    /// FTS5 `bm25()` is smaller-is-better; ascending order puts the
    /// best match first. The raw bm25 value is carried for debugging.
    pub fn search_lexical(&self, query: &str, scope: &Scope, k: usize) -> Result<Vec<RankedHit>> {
        let sanitized = super::sanitize_fts_query(query);
        if sanitized.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        // The FTS table keeps its full name: MATCH binds to the table
        // name, and equal scores break on (chunk_index, chunk_id) so
        // the ranking is stable across runs.
        let (sql, scope_param): (&str, &str) = match scope {
            Scope::Global => (
                "SELECT chunks_fts.chunk_id, c.chunk_index, bm25(chunks_fts) AS score
                 FROM chunks_fts
                 JOIN chunks c ON c.id = chunks_fts.chunk_id
                 JOIN documents d ON d.id = c.document_id
                 WHERE d.workspace_id = ?1 AND chunks_fts MATCH ?2
                 ORDER BY score, c.chunk_index, chunks_fts.chunk_id
                 LIMIT ?3",
                crate::db::GLOBAL_WORKSPACE,
            ),
            Scope::Workspace(id) => (
                "SELECT chunks_fts.chunk_id, c.chunk_index, bm25(chunks_fts) AS score
                 FROM chunks_fts
                 JOIN chunks c ON c.id = chunks_fts.chunk_id
                 JOIN documents d ON d.id = c.document_id
                 WHERE d.workspace_id = ?1 AND chunks_fts MATCH ?2
                 ORDER BY score, c.chunk_index, chunks_fts.chunk_id
                 LIMIT ?3",
                id.as_str(),
            ),
            Scope::Session(id) => (
                "SELECT chunks_fts.chunk_id, c.chunk_index, bm25(chunks_fts) AS score
                 FROM chunks_fts
                 JOIN chunks c ON c.id = chunks_fts.chunk_id
                 JOIN documents d ON d.id = c.document_id
                 JOIN document_sessions s ON s.document_id = d.id
                 WHERE s.session_id = ?1 AND chunks_fts MATCH ?2
                 ORDER BY score, c.chunk_index, chunks_fts.chunk_id
                 LIMIT ?3",
                id.as_str(),
            ),
        };

        let mut stmt = self.conn.prepare(sql)?;
        let hits = stmt
            .query_map(params![scope_param, sanitized, k as i64], |row| {
                Ok(RankedHit {
                    chunk_id: row.get(0)?,
                    chunk_index: row.get(1)?,
                    score: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ChunkInput, DocumentInsert, GLOBAL_WORKSPACE};
    use chrono::Utc;

    fn seed(db: &Database, doc_id: &str, workspace: &str, hash: &str, content: &str) {
        db.ensure_workspace(workspace, workspace, Utc::now()).unwrap();
        db.insert_document(
            &DocumentInsert {
                id: doc_id,
                workspace_id: workspace,
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
        db.replace_document_chunks(
            doc_id,
            "seed",
            &[ChunkInput {
                id: format!("{}-c0", doc_id),
                chunk_index: 0,
                section_title: None,
                content: content.to_string(),
                token_count: None,
            }],
            Utc::now(),
        )
        .unwrap();
    }

    #[test]
    fn test_match_restricted_to_scope() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        seed(&db, "global-doc", GLOBAL_WORKSPACE, "h1", "the quick brown fox");
        seed(&db, "ws-doc", "other", "h2", "the quick brown fox");

        let hits = db
            .search_lexical("quick fox", &Scope::Global, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "global-doc-c0");

        let hits = db
            .search_lexical("quick fox", &Scope::Workspace("other".into()), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "ws-doc-c0");
    }

    #[test]
    fn test_session_scope_requires_link() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        seed(&db, "doc-a", GLOBAL_WORKSPACE, "h1", "session bound words");
        db.attach_document_to_session("doc-a", "s1", Utc::now()).unwrap();

        let hits = db
            .search_lexical("session words", &Scope::Session("s1".into()), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits = db
            .search_lexical("session words", &Scope::Session("s2".into()), 10)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_degenerate_query_yields_nothing() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        seed(&db, "doc-a", GLOBAL_WORKSPACE, "h1", "anything");

        assert!(db.search_lexical("***", &Scope::Global, 10).unwrap().is_empty());
        assert!(db.search_lexical("", &Scope::Global, 10).unwrap().is_empty());
    }

    #[test]
    fn test_injection_tokens_do_not_error() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        seed(&db, "doc-a", GLOBAL_WORKSPACE, "h1", "alpha NOT beta");

        // Operator words match literally instead of parsing as syntax
        let hits = db
            .search_lexical("alpha NOT beta", &Scope::Global, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
