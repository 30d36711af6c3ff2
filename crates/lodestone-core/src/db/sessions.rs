//! Session attachment for local-scope documents

use super::Database;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

impl Database {
    /// Link a document to a session (idempotent)
    pub fn attach_document_to_session(
        &self,
        document_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO document_sessions (document_id, session_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![document_id, session_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn detach_document_from_session(&self, document_id: &str, session_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM document_sessions WHERE document_id = ?1 AND session_id = ?2",
            params![document_id, session_id],
        )?;
        Ok(())
    }

    /// Document ids attached to a session
    pub fn session_document_ids(&self, session_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT document_id FROM document_sessions WHERE session_id = ?1")?;
        let ids = stmt
            .query_map(params![session_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn document_linked_to_session(&self, document_id: &str, session_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM document_sessions WHERE document_id = ?1 AND session_id = ?2",
            params![document_id, session_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentInsert, GLOBAL_WORKSPACE};

    #[test]
    fn test_attach_detach() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.insert_document(
            &DocumentInsert {
                id: "doc-1",
                workspace_id: GLOBAL_WORKSPACE,
                artifact_entry_id: None,
                source_type: "pdf",
                source_name: "a",
                source_path: None,
                content_hash: "h",
                file_size: None,
            },
            Utc::now(),
        )
        .unwrap();

        db.attach_document_to_session("doc-1", "s1", Utc::now()).unwrap();
        db.attach_document_to_session("doc-1", "s1", Utc::now()).unwrap();
        assert!(db.document_linked_to_session("doc-1", "s1").unwrap());
        assert_eq!(db.session_document_ids("s1").unwrap(), vec!["doc-1"]);

        db.detach_document_from_session("doc-1", "s1").unwrap();
        assert!(!db.document_linked_to_session("doc-1", "s1").unwrap());
    }

    #[test]
    fn test_link_cascades_with_document() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.insert_document(
            &DocumentInsert {
                id: "doc-1",
                workspace_id: GLOBAL_WORKSPACE,
                artifact_entry_id: None,
                source_type: "pdf",
                source_name: "a",
                source_path: None,
                content_hash: "h",
                file_size: None,
            },
            Utc::now(),
        )
        .unwrap();
        db.attach_document_to_session("doc-1", "s1", Utc::now()).unwrap();

        db.delete_document("doc-1").unwrap();
        assert!(db.session_document_ids("s1").unwrap().is_empty());
    }
}
