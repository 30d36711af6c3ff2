//! Database schema and initialization

use crate::error::{LodestoneError, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

/// Main database handle
///
/// One handle per worker thread or task; WAL keeps readers concurrent
/// with the single writer.
pub struct Database {
    pub(crate) conn: Connection,
}

const SCHEMA_VERSION: i32 = 2;

/// Column order of the FTS table, verified at startup
const FTS_COLUMNS: [&str; 4] = ["chunk_id", "content", "section_title", "source_name"];

const CREATE_TABLES: &str = r#"
-- Top-level corpus containers; the GLOBAL row is created at init
CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- One row per indexed piece of content, addressed by workspace + hash
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    artifact_entry_id TEXT,
    source_type TEXT NOT NULL,
    source_name TEXT NOT NULL,
    source_path TEXT,
    content_hash TEXT NOT NULL,
    file_size INTEGER,
    indexed_at TEXT NOT NULL,
    stale_at TEXT,
    embedding_status TEXT NOT NULL DEFAULT 'disabled',
    embedding_model TEXT,
    embedding_error TEXT,
    UNIQUE(workspace_id, content_hash)
);

-- Session attachment for local-scope documents
CREATE TABLE IF NOT EXISTS document_sessions (
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    session_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (document_id, session_id)
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    section_title TEXT,
    content TEXT NOT NULL,
    token_count INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE(document_id, chunk_index)
);

-- Full-text index, maintained in the same transaction as chunks
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    chunk_id UNINDEXED,
    content,
    section_title,
    source_name,
    tokenize='porter unicode61'
);

-- One embedding per chunk; vector is little-endian f32, 4*dims bytes
CREATE TABLE IF NOT EXISTS embeddings (
    chunk_id TEXT PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    dims INTEGER NOT NULL,
    vector BLOB NOT NULL,
    created_at TEXT NOT NULL
);

-- Tracks monitored source paths for the watcher
CREATE TABLE IF NOT EXISTS index_registry (
    source_path TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_seen_at TEXT,
    last_indexed_at TEXT,
    error_message TEXT,
    embedding_model TEXT
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE INDEX IF NOT EXISTS idx_documents_workspace ON documents(workspace_id);
CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(workspace_id, content_hash);
CREATE INDEX IF NOT EXISTS idx_documents_stale ON documents(stale_at);
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
CREATE INDEX IF NOT EXISTS idx_document_sessions_session ON document_sessions(session_id);
CREATE INDEX IF NOT EXISTS idx_registry_status ON index_registry(status);
"#;

impl Database {
    /// Open database at path, creating parent dirs if necessary
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Initialize database schema idempotently
    ///
    /// Creates tables, applies additive migrations, ensures the GLOBAL
    /// workspace row exists, and verifies the FTS table layout.
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        let existing = self.schema_version()?;
        if let Some(version) = existing {
            if version > SCHEMA_VERSION {
                return Err(LodestoneError::StorageInit(format!(
                    "database schema version {} is newer than supported {}",
                    version, SCHEMA_VERSION
                )));
            }
        }

        self.conn.execute_batch(CREATE_TABLES)?;
        self.migrate()?;

        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        self.ensure_global_workspace()?;
        self.verify_fts_layout()?;

        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<Option<i32>> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();
        Ok(version)
    }

    /// Run additive migrations to upgrade older databases
    fn migrate(&self) -> Result<()> {
        let current = self.schema_version()?.unwrap_or(0);

        if current != 0 && current < 2 {
            self.migrate_to_v2()?;
        }

        Ok(())
    }

    /// v2 added per-document embedding bookkeeping
    fn migrate_to_v2(&self) -> Result<()> {
        for column in ["embedding_status", "embedding_model", "embedding_error"] {
            let has_column: bool = self
                .conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM pragma_table_info('documents') WHERE name = ?1",
                    params![column],
                    |row| row.get(0),
                )
                .unwrap_or(false);

            if !has_column {
                let ddl = if column == "embedding_status" {
                    "ALTER TABLE documents ADD COLUMN embedding_status TEXT NOT NULL DEFAULT 'disabled'".to_string()
                } else {
                    format!("ALTER TABLE documents ADD COLUMN {} TEXT", column)
                };
                self.conn.execute(&ddl, [])?;
            }
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![2],
        )?;

        Ok(())
    }

    fn ensure_global_workspace(&self) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO workspaces (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![super::GLOBAL_WORKSPACE, "Global corpus", now],
        )?;
        Ok(())
    }

    /// The FTS table must exist with the expected column order; a
    /// mismatch means the file was written by an incompatible build.
    fn verify_fts_layout(&self) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info('chunks_fts') ORDER BY cid")
            .map_err(|e| LodestoneError::StorageInit(format!("missing chunks_fts: {}", e)))?;
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if columns != FTS_COLUMNS {
            return Err(LodestoneError::StorageInit(format!(
                "chunks_fts columns {:?} do not match expected {:?}",
                columns, FTS_COLUMNS
            )));
        }
        Ok(())
    }

    /// Reclaim space after bulk deletes
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute("VACUUM", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        assert_eq!(db.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();

        let count: i64 = db
            .conn
            .query_row(
                "SELECT COUNT(*) FROM workspaces WHERE id = ?1",
                params![crate::db::GLOBAL_WORKSPACE],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
                 INSERT INTO schema_version VALUES (99);",
            )
            .unwrap();
        let err = db.initialize().unwrap_err();
        assert!(matches!(err, LodestoneError::StorageInit(_)));
    }

    #[test]
    fn test_migration_v1_to_v2() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TABLE workspaces (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE documents (
                    id TEXT PRIMARY KEY,
                    workspace_id TEXT NOT NULL,
                    artifact_entry_id TEXT,
                    source_type TEXT NOT NULL,
                    source_name TEXT NOT NULL,
                    source_path TEXT,
                    content_hash TEXT NOT NULL,
                    file_size INTEGER,
                    indexed_at TEXT NOT NULL,
                    stale_at TEXT,
                    UNIQUE(workspace_id, content_hash)
                );
                CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
                INSERT INTO schema_version VALUES (1);",
            )
            .unwrap();

        assert_eq!(db.schema_version().unwrap(), Some(1));
        db.initialize().unwrap();
        assert_eq!(db.schema_version().unwrap(), Some(SCHEMA_VERSION));

        let has_status: bool = db
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('documents') WHERE name = 'embedding_status'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(has_status, "documents should have embedding_status column");
    }
}
