//! Vector storage operations
//!
//! Embeddings are stored as headerless little-endian f32 BLOBs of
//! exactly `4 * dims` bytes. Similarity is computed in Rust; the
//! candidate set is already scope-limited by SQL.

use super::Database;
use crate::error::{LodestoneError, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;

/// Embedding payload for one chunk
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub chunk_id: String,
    pub model: String,
    pub vector: Vec<f32>,
}

/// Scope-limited embedding row as loaded for similarity search
#[derive(Debug, Clone)]
pub struct ScopedEmbedding {
    pub chunk_id: String,
    pub chunk_index: i64,
    pub vector: Vec<f32>,
}

/// Encode a vector as a little-endian f32 blob
pub fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a blob, validating the `4 * dims` length contract
pub fn bytes_to_embedding(bytes: &[u8], dims: usize) -> Result<Vec<f32>> {
    if dims == 0 || bytes.len() != dims * 4 {
        return Err(LodestoneError::Integrity(format!(
            "vector blob is {} bytes, expected {} for dims {}",
            bytes.len(),
            dims * 4,
            dims
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Cosine similarity; zero norms yield 0.0 rather than an error
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

impl Database {
    /// Upsert embeddings in a single transaction
    pub fn upsert_embeddings(&self, embeddings: &[EmbeddingInput], now: DateTime<Utc>) -> Result<()> {
        if embeddings.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO embeddings (chunk_id, model, dims, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(chunk_id) DO UPDATE SET
                     model = excluded.model,
                     dims = excluded.dims,
                     vector = excluded.vector,
                     created_at = excluded.created_at",
            )?;
            let created = now.to_rfc3339();
            for embedding in embeddings {
                if embedding.vector.is_empty() {
                    return Err(LodestoneError::Integrity(format!(
                        "empty embedding for chunk {}",
                        embedding.chunk_id
                    )));
                }
                stmt.execute(params![
                    embedding.chunk_id,
                    embedding.model,
                    embedding.vector.len() as i64,
                    embedding_to_bytes(&embedding.vector),
                    created,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Whether every chunk of the document is embedded under `model`
    pub fn document_embeddings_current(&self, document_id: &str, model: &str) -> Result<bool> {
        let missing: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks c
             LEFT JOIN embeddings e ON e.chunk_id = c.id AND e.model = ?2
             WHERE c.document_id = ?1 AND e.chunk_id IS NULL",
            params![document_id, model],
            |row| row.get(0),
        )?;
        Ok(missing == 0)
    }

    /// Load all embeddings visible under a scope predicate.
    ///
    /// The predicate is expressed entirely in SQL; callers never
    /// post-filter.
    pub fn embeddings_for_scope(
        &self,
        scope: &crate::search::Scope,
        model: &str,
    ) -> Result<Vec<ScopedEmbedding>> {
        let (sql, param): (&str, &str) = match scope {
            crate::search::Scope::Global => (
                "SELECT e.chunk_id, c.chunk_index, e.vector, e.dims
                 FROM embeddings e
                 JOIN chunks c ON c.id = e.chunk_id
                 JOIN documents d ON d.id = c.document_id
                 WHERE d.workspace_id = ?1 AND e.model = ?2",
                super::GLOBAL_WORKSPACE,
            ),
            crate::search::Scope::Workspace(id) => (
                "SELECT e.chunk_id, c.chunk_index, e.vector, e.dims
                 FROM embeddings e
                 JOIN chunks c ON c.id = e.chunk_id
                 JOIN documents d ON d.id = c.document_id
                 WHERE d.workspace_id = ?1 AND e.model = ?2",
                id.as_str(),
            ),
            crate::search::Scope::Session(id) => (
                "SELECT e.chunk_id, c.chunk_index, e.vector, e.dims
                 FROM embeddings e
                 JOIN chunks c ON c.id = e.chunk_id
                 JOIN documents d ON d.id = c.document_id
                 JOIN document_sessions s ON s.document_id = d.id
                 WHERE s.session_id = ?1 AND e.model = ?2",
                id.as_str(),
            ),
        };

        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params![param, model])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let chunk_id: String = row.get(0)?;
            let chunk_index: i64 = row.get(1)?;
            let blob: Vec<u8> = row.get(2)?;
            let dims: i64 = row.get(3)?;
            let vector = bytes_to_embedding(&blob, dims as usize)?;
            results.push(ScopedEmbedding {
                chunk_id,
                chunk_index,
                vector,
            });
        }
        Ok(results)
    }

    /// Whether any embeddings exist at all
    pub fn has_embeddings(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count > 0)
    }
}
