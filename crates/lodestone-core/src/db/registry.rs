//! Index registry: which filesystem paths have been seen, with hash,
//! status and retry history. Drives the watcher's dedup and retry
//! policy.

use super::Database;
use crate::error::{LodestoneError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

/// Lifecycle of a monitored source path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryStatus {
    Pending,
    Indexed,
    Failed,
    Skipped,
}

impl RegistryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "indexed" => Ok(Self::Indexed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(LodestoneError::Integrity(format!(
                "unknown registry status: {}",
                other
            ))),
        }
    }
}

/// One monitored path
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub source_path: String,
    pub content_hash: String,
    pub status: RegistryStatus,
    pub retry_count: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub embedding_model: Option<String>,
}

fn row_to_entry(row: &Row) -> rusqlite::Result<RegistryEntry> {
    let status: String = row.get(2)?;
    let last_seen: Option<String> = row.get(4)?;
    let last_indexed: Option<String> = row.get(5)?;
    Ok(RegistryEntry {
        source_path: row.get(0)?,
        content_hash: row.get(1)?,
        status: RegistryStatus::parse(&status).unwrap_or(RegistryStatus::Failed),
        retry_count: row.get(3)?,
        last_seen_at: last_seen.as_deref().and_then(parse_ts),
        last_indexed_at: last_indexed.as_deref().and_then(parse_ts),
        error_message: row.get(6)?,
        embedding_model: row.get(7)?,
    })
}

fn parse_ts(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

const REGISTRY_COLUMNS: &str = "source_path, content_hash, status, retry_count, \
     last_seen_at, last_indexed_at, error_message, embedding_model";

impl Database {
    /// Insert or update the registry row for a path
    pub fn upsert_registry_entry(&self, entry: &RegistryEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO index_registry (
                source_path, content_hash, status, retry_count,
                last_seen_at, last_indexed_at, error_message, embedding_model
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(source_path) DO UPDATE SET
                content_hash = excluded.content_hash,
                status = excluded.status,
                retry_count = excluded.retry_count,
                last_seen_at = excluded.last_seen_at,
                last_indexed_at = excluded.last_indexed_at,
                error_message = excluded.error_message,
                embedding_model = excluded.embedding_model",
            params![
                entry.source_path,
                entry.content_hash,
                entry.status.as_str(),
                entry.retry_count,
                entry.last_seen_at.map(|dt| dt.to_rfc3339()),
                entry.last_indexed_at.map(|dt| dt.to_rfc3339()),
                entry.error_message,
                entry.embedding_model,
            ],
        )?;
        Ok(())
    }

    pub fn get_registry_entry(&self, source_path: &str) -> Result<Option<RegistryEntry>> {
        let sql = format!(
            "SELECT {} FROM index_registry WHERE source_path = ?1",
            REGISTRY_COLUMNS
        );
        let entry = self
            .conn
            .query_row(&sql, params![source_path], row_to_entry)
            .optional()?;
        Ok(entry)
    }

    /// List entries, optionally filtered by status
    pub fn list_registry_entries(
        &self,
        status: Option<RegistryStatus>,
    ) -> Result<Vec<RegistryEntry>> {
        let entries = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM index_registry WHERE status = ?1 ORDER BY source_path",
                    REGISTRY_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![status.as_str()], row_to_entry)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM index_registry ORDER BY source_path",
                    REGISTRY_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], row_to_entry)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(entries)
    }

    /// Count of entries per status
    pub fn registry_status_counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM index_registry GROUP BY status ORDER BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Touch `last_seen_at` without changing anything else
    pub fn touch_registry_entry(&self, source_path: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE index_registry SET last_seen_at = ?2 WHERE source_path = ?1",
            params![source_path, now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_registry_entry(&self, source_path: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM index_registry WHERE source_path = ?1",
            params![source_path],
        )?;
        Ok(())
    }
}
