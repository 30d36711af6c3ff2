//! Reciprocal Rank Fusion
//!
//! An item at rank r (1-based) in a list contributes 1/(rrf_k + r);
//! contributions sum across lists. Equal fused scores break ties on
//! (chunk_index, chunk_id) so the order is identical across runs.

use super::RankedHit;
use std::collections::HashMap;

/// Fused entry with the tie-break key attached
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub chunk_id: String,
    pub chunk_index: i64,
    pub score: f64,
}

/// Fuse ranked lists; returns all distinct chunks ordered by fused
/// score descending.
pub fn rrf_fuse(lists: &[Vec<RankedHit>], rrf_k: usize) -> Vec<FusedHit> {
    let mut scores: HashMap<String, (f64, i64)> = HashMap::new();

    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = 1.0 / (rrf_k as f64 + (rank + 1) as f64);
            let entry = scores
                .entry(hit.chunk_id.clone())
                .or_insert((0.0, hit.chunk_index));
            entry.0 += contribution;
        }
    }

    let mut fused: Vec<FusedHit> = scores
        .into_iter()
        .map(|(chunk_id, (score, chunk_index))| FusedHit {
            chunk_id,
            chunk_index,
            score,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, index: i64) -> RankedHit {
        RankedHit {
            chunk_id: id.to_string(),
            chunk_index: index,
            score: 0.0,
        }
    }

    #[test]
    fn test_single_list_preserves_order() {
        let lists = vec![vec![hit("a", 0), hit("b", 1), hit("c", 2)]];
        let fused = rrf_fuse(&lists, 60);
        let ids: Vec<&str> = fused.iter().map(|f| f.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_cross_list_accumulation() {
        // "b" is rank 2 in both lists, "a" and "c" rank 1 in one each
        let lists = vec![
            vec![hit("a", 0), hit("b", 1)],
            vec![hit("c", 2), hit("b", 1)],
        ];
        let fused = rrf_fuse(&lists, 60);
        assert_eq!(fused[0].chunk_id, "b");
        let expected = 2.0 / 62.0;
        assert!((fused[0].score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_tie_break_on_index_then_id() {
        // Both appear once at the same rank in separate lists
        let lists = vec![vec![hit("z-chunk", 0)], vec![hit("a-chunk", 0)]];
        let fused = rrf_fuse(&lists, 60);
        assert_eq!(fused[0].chunk_id, "a-chunk");

        let lists = vec![vec![hit("z-chunk", 0)], vec![hit("a-chunk", 5)]];
        let fused = rrf_fuse(&lists, 60);
        assert_eq!(fused[0].chunk_id, "z-chunk");
    }

    #[test]
    fn test_deterministic_across_runs() {
        let lists = vec![
            vec![hit("a", 0), hit("b", 1), hit("c", 2)],
            vec![hit("c", 2), hit("a", 0)],
            vec![hit("b", 1)],
        ];
        let first: Vec<String> = rrf_fuse(&lists, 60).into_iter().map(|f| f.chunk_id).collect();
        for _ in 0..10 {
            let again: Vec<String> =
                rrf_fuse(&lists, 60).into_iter().map(|f| f.chunk_id).collect();
            assert_eq!(again, first);
        }
    }
}
