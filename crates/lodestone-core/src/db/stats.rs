//! Index statistics

use super::Database;
use crate::error::Result;
use serde::Serialize;

/// Corpus counters for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub workspace_count: i64,
    pub document_count: i64,
    pub chunk_count: i64,
    pub embedding_count: i64,
    pub stale_document_count: i64,
    pub registry_counts: Vec<(String, i64)>,
}

impl Database {
    pub fn stats(&self) -> Result<IndexStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        Ok(IndexStats {
            workspace_count: count("SELECT COUNT(*) FROM workspaces")?,
            document_count: count("SELECT COUNT(*) FROM documents")?,
            chunk_count: count("SELECT COUNT(*) FROM chunks")?,
            embedding_count: count("SELECT COUNT(*) FROM embeddings")?,
            stale_document_count: count(
                "SELECT COUNT(*) FROM documents WHERE stale_at IS NOT NULL",
            )?,
            registry_counts: self.registry_status_counts()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_on_fresh_database() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.workspace_count, 1, "GLOBAL workspace exists");
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.chunk_count, 0);
    }
}
