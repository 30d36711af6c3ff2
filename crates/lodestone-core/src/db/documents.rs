//! Document row operations
//!
//! The indexer is the only writer; retrieval reads through the scope
//! predicate in the search module.

use super::Database;
use crate::error::{LodestoneError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

/// Embedding lifecycle of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingStatus {
    /// Embeddings were not requested
    Disabled,
    /// All chunks embedded under `embedding_model`
    Indexed,
    /// Provider failed; document is lexical-only
    Failed,
    /// Nothing to embed (empty chunk set)
    Skipped,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "disabled" => Ok(Self::Disabled),
            "indexed" => Ok(Self::Indexed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(LodestoneError::Integrity(format!(
                "unknown embedding status: {}",
                other
            ))),
        }
    }
}

/// Persisted document metadata
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub workspace_id: String,
    pub artifact_entry_id: Option<String>,
    pub source_type: String,
    pub source_name: String,
    pub source_path: Option<String>,
    pub content_hash: String,
    pub file_size: Option<i64>,
    pub indexed_at: DateTime<Utc>,
    pub stale_at: Option<DateTime<Utc>>,
    pub embedding_status: EmbeddingStatus,
    pub embedding_model: Option<String>,
    pub embedding_error: Option<String>,
}

/// Fields for a new document row
#[derive(Debug, Clone)]
pub struct DocumentInsert<'a> {
    pub id: &'a str,
    pub workspace_id: &'a str,
    pub artifact_entry_id: Option<&'a str>,
    pub source_type: &'a str,
    pub source_name: &'a str,
    pub source_path: Option<&'a str>,
    pub content_hash: &'a str,
    pub file_size: Option<i64>,
}

fn row_to_document(row: &Row) -> rusqlite::Result<DocumentRow> {
    let indexed_at: String = row.get(8)?;
    let stale_at: Option<String> = row.get(9)?;
    let status: String = row.get(10)?;
    Ok(DocumentRow {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        artifact_entry_id: row.get(2)?,
        source_type: row.get(3)?,
        source_name: row.get(4)?,
        source_path: row.get(5)?,
        content_hash: row.get(6)?,
        file_size: row.get(7)?,
        indexed_at: parse_ts(&indexed_at),
        stale_at: stale_at.as_deref().map(parse_ts),
        embedding_status: EmbeddingStatus::parse(&status).unwrap_or(EmbeddingStatus::Disabled),
        embedding_model: row.get(11)?,
        embedding_error: row.get(12)?,
    })
}

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const DOCUMENT_COLUMNS: &str = "id, workspace_id, artifact_entry_id, source_type, source_name, \
     source_path, content_hash, file_size, indexed_at, stale_at, \
     embedding_status, embedding_model, embedding_error";

impl Database {
    /// Ensure a workspace row exists
    pub fn ensure_workspace(&self, workspace_id: &str, name: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO workspaces (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![workspace_id, name, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Insert a new document row
    pub fn insert_document(&self, doc: &DocumentInsert, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO documents (
                id, workspace_id, artifact_entry_id, source_type, source_name,
                source_path, content_hash, file_size, indexed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                doc.id,
                doc.workspace_id,
                doc.artifact_entry_id,
                doc.source_type,
                doc.source_name,
                doc.source_path,
                doc.content_hash,
                doc.file_size,
                now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a document by its content address
    pub fn get_document_by_hash(
        &self,
        workspace_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentRow>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE workspace_id = ?1 AND content_hash = ?2",
            DOCUMENT_COLUMNS
        );
        let result = self
            .conn
            .query_row(&sql, params![workspace_id, content_hash], row_to_document)
            .optional()?;
        Ok(result)
    }

    pub fn get_document(&self, document_id: &str) -> Result<Option<DocumentRow>> {
        let sql = format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS);
        let result = self
            .conn
            .query_row(&sql, params![document_id], row_to_document)
            .optional()?;
        Ok(result)
    }

    /// Refresh the indexed timestamp and clear any stale tombstone
    pub fn touch_document(&self, document_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE documents SET indexed_at = ?2, stale_at = NULL WHERE id = ?1",
            params![document_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Update source metadata on re-ingest of changed content
    pub fn update_document_source(
        &self,
        document_id: &str,
        source_name: &str,
        source_path: Option<&str>,
        file_size: Option<i64>,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE documents
             SET source_name = ?2, source_path = ?3, file_size = ?4,
                 content_hash = ?5, indexed_at = ?6, stale_at = NULL
             WHERE id = ?1",
            params![
                document_id,
                source_name,
                source_path,
                file_size,
                content_hash,
                now.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn set_document_embedding_status(
        &self,
        document_id: &str,
        status: EmbeddingStatus,
        model: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE documents
             SET embedding_status = ?2, embedding_model = ?3, embedding_error = ?4
             WHERE id = ?1",
            params![document_id, status.as_str(), model, error],
        )?;
        Ok(())
    }

    /// Stamp session-linked documents as stale candidates for cleanup
    pub fn mark_session_documents_stale(&self, session_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE documents SET stale_at = ?2
             WHERE id IN (SELECT document_id FROM document_sessions WHERE session_id = ?1)
               AND workspace_id != ?3",
            params![session_id, now.to_rfc3339(), super::GLOBAL_WORKSPACE],
        )?;
        Ok(rows)
    }

    /// Session-scoped documents whose tombstone predates the cutoff
    pub fn list_stale_documents(&self, cutoff: DateTime<Utc>) -> Result<Vec<DocumentRow>> {
        let sql = format!(
            "SELECT {} FROM documents
             WHERE stale_at IS NOT NULL AND stale_at < ?1 AND workspace_id != ?2",
            DOCUMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![cutoff.to_rfc3339(), super::GLOBAL_WORKSPACE],
                row_to_document,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete a document and all derived rows
    ///
    /// FTS rows have no foreign key, so they go first, in the same
    /// transaction as the parent row.
    pub fn delete_document(&self, document_id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM chunks_fts WHERE chunk_id IN
             (SELECT id FROM chunks WHERE document_id = ?1)",
            params![document_id],
        )?;
        tx.execute("DELETE FROM documents WHERE id = ?1", params![document_id])?;
        tx.commit()?;
        Ok(())
    }
}
