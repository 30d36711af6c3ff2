//! Vector similarity search
//!
//! Exact cosine over the scope-limited candidate set; no approximate
//! index at the target corpus scale.

use super::{RankedHit, Scope};
use crate::db::vectors::{cosine_similarity, ScopedEmbedding};
use crate::db::Database;
use crate::error::Result;

/// Score scope-visible embeddings against a query vector, returning
/// the top `k` by cosine similarity. Ties break on (chunk_index,
/// chunk_id) for determinism.
pub fn vector_search(
    stored: &[ScopedEmbedding],
    query_vector: &[f32],
    k: usize,
) -> Vec<RankedHit> {
    if k == 0 || query_vector.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<RankedHit> = stored
        .iter()
        .map(|embedding| RankedHit {
            chunk_id: embedding.chunk_id.clone(),
            chunk_index: embedding.chunk_index,
            score: cosine_similarity(query_vector, &embedding.vector) as f64,
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(k);
    hits
}

impl Database {
    /// Load scope-visible embeddings once; callers score them against
    /// each query variant without re-reading the database.
    pub fn load_scope_embeddings(
        &self,
        scope: &Scope,
        model: &str,
    ) -> Result<Vec<ScopedEmbedding>> {
        self.embeddings_for_scope(scope, model)
    }
}
