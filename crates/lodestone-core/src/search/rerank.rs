//! Heuristic reranking
//!
//! Reorders fused candidates by a weighted score: the fused score,
//! a bonus for titled sections, a per-document diversity penalty, and
//! in session scope a recency bonus. The LLM reranker, when enabled
//! and healthy, replaces this ordering entirely.

use super::{Candidate, Scope};
use crate::db::ChunkDetails;
use std::collections::HashMap;

const SECTION_TITLE_BONUS: f64 = 0.05;
const SAME_DOCUMENT_DECAY: f64 = 0.9;
const RECENCY_BONUS: f64 = 0.03;

/// Rerank candidates in place of the fused order.
///
/// Candidates missing details keep their fused score. Ties preserve
/// the incoming (already deterministic) order via a stable sort.
pub fn heuristic_rerank(
    mut candidates: Vec<Candidate>,
    details_by_id: &HashMap<String, ChunkDetails>,
    scope: &Scope,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let timestamps: Vec<i64> = details_by_id
        .values()
        .map(|d| d.document_indexed_at.timestamp())
        .collect();
    let min_ts = timestamps.iter().min().copied().unwrap_or(0);
    let max_ts = timestamps.iter().max().copied().unwrap_or(0);

    let mut doc_counts: HashMap<String, usize> = HashMap::new();
    for candidate in candidates.iter_mut() {
        let details = match details_by_id.get(&candidate.chunk_id) {
            Some(details) => details,
            None => {
                candidate.rerank_score = candidate.fused_score;
                continue;
            }
        };

        let seen = doc_counts.entry(details.document_id.clone()).or_insert(0);
        let mut score = candidate.fused_score;
        if details.section_title.is_some() {
            score += SECTION_TITLE_BONUS;
        }
        if *seen > 0 {
            score *= SAME_DOCUMENT_DECAY.powi(*seen as i32);
        }
        if matches!(scope, Scope::Session(_)) && max_ts > min_ts {
            let recency =
                (details.document_indexed_at.timestamp() - min_ts) as f64 / (max_ts - min_ts) as f64;
            score += recency * RECENCY_BONUS;
        }
        *seen += 1;
        candidate.rerank_score = score;
    }

    candidates.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candidate(id: &str, fused: f64) -> Candidate {
        Candidate {
            chunk_id: id.to_string(),
            fused_score: fused,
            lexical_score: None,
            vector_score: None,
            rerank_score: 0.0,
        }
    }

    fn details(id: &str, doc: &str, title: Option<&str>, ts: i64) -> (String, ChunkDetails) {
        (
            id.to_string(),
            ChunkDetails {
                id: id.to_string(),
                document_id: doc.to_string(),
                chunk_index: 0,
                section_title: title.map(|t| t.to_string()),
                content: "text".to_string(),
                source_name: "src".to_string(),
                workspace_id: "GLOBAL".to_string(),
                document_indexed_at: Utc.timestamp_opt(ts, 0).unwrap(),
            },
        )
    }

    #[test]
    fn test_section_title_bonus_reorders_close_scores() {
        let details_map: HashMap<_, _> = vec![
            details("untitled", "d1", None, 100),
            details("titled", "d2", Some("Intro"), 100),
        ]
        .into_iter()
        .collect();

        let reranked = heuristic_rerank(
            vec![candidate("untitled", 0.50), candidate("titled", 0.48)],
            &details_map,
            &Scope::Global,
        );
        assert_eq!(reranked[0].chunk_id, "titled");
    }

    #[test]
    fn test_same_document_diversity_penalty() {
        let details_map: HashMap<_, _> = vec![
            details("c1", "same-doc", None, 100),
            details("c2", "same-doc", None, 100),
            details("c3", "other-doc", None, 100),
        ]
        .into_iter()
        .collect();

        let reranked = heuristic_rerank(
            vec![
                candidate("c1", 0.50),
                candidate("c2", 0.49),
                candidate("c3", 0.46),
            ],
            &details_map,
            &Scope::Global,
        );
        // The second chunk of the repeated document decays below the
        // diverse candidate
        assert_eq!(reranked[0].chunk_id, "c1");
        assert_eq!(reranked[1].chunk_id, "c3");
        assert_eq!(reranked[2].chunk_id, "c2");
    }

    #[test]
    fn test_recency_bonus_only_in_session_scope() {
        let details_map: HashMap<_, _> = vec![
            details("old", "d1", None, 100),
            details("new", "d2", None, 10_000),
        ]
        .into_iter()
        .collect();

        let session = heuristic_rerank(
            vec![candidate("old", 0.50), candidate("new", 0.48)],
            &details_map,
            &Scope::Session("s".into()),
        );
        assert_eq!(session[0].chunk_id, "new");

        let global = heuristic_rerank(
            vec![candidate("old", 0.50), candidate("new", 0.48)],
            &details_map,
            &Scope::Global,
        );
        assert_eq!(global[0].chunk_id, "old");
    }

    #[test]
    fn test_missing_details_keep_fused_score() {
        let reranked = heuristic_rerank(
            vec![candidate("ghost", 0.7)],
            &HashMap::new(),
            &Scope::Global,
        );
        assert_eq!(reranked[0].rerank_score, 0.7);
    }
}
