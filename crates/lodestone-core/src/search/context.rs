//! Context selection and assembly
//!
//! Drops candidates adjacent to a higher-ranked selection from the
//! same document, enforces chunk and character budgets, and emits a
//! bounded context block with `[n]` citation markers.

use super::{Candidate, Citation, RetrievedChunk};
use crate::db::ChunkDetails;
use std::collections::{HashMap, HashSet};

/// Pick context chunks from reranked candidates.
///
/// A candidate whose `chunk_index` is within one of an already
/// selected chunk of the same document is skipped; its content is
/// largely covered by the overlap. The character budget is soft for
/// the first selection so a single long chunk still grounds the
/// answer.
pub fn select_context_chunks(
    candidates: &[Candidate],
    details_by_id: &HashMap<String, ChunkDetails>,
    max_chunks: usize,
    max_chars: usize,
) -> Vec<String> {
    let mut selected: Vec<String> = Vec::new();
    let mut taken_per_doc: HashMap<String, HashSet<i64>> = HashMap::new();
    let mut total_chars = 0usize;

    for candidate in candidates {
        let details = match details_by_id.get(&candidate.chunk_id) {
            Some(details) => details,
            None => continue,
        };

        let taken = taken_per_doc.entry(details.document_id.clone()).or_default();
        if taken
            .iter()
            .any(|idx| (details.chunk_index - idx).abs() <= 1)
        {
            continue;
        }

        let chunk_len = details.content.chars().count();
        if total_chars + chunk_len > max_chars && !selected.is_empty() {
            break;
        }

        taken.insert(details.chunk_index);
        selected.push(candidate.chunk_id.clone());
        total_chars += chunk_len;

        if selected.len() >= max_chunks {
            break;
        }
    }

    selected
}

/// Build the context block and its citation table.
pub fn build_context(
    chunk_ids: &[String],
    details_by_id: &HashMap<String, ChunkDetails>,
) -> (String, Vec<Citation>, Vec<RetrievedChunk>) {
    if chunk_ids.is_empty() {
        return (String::new(), Vec::new(), Vec::new());
    }

    let mut lines = vec!["<retrieved-context>".to_string()];
    let mut citations = Vec::new();
    let mut chunks = Vec::new();

    for (position, chunk_id) in chunk_ids.iter().enumerate() {
        let details = match details_by_id.get(chunk_id) {
            Some(details) => details,
            None => continue,
        };
        let marker = position + 1;

        let mut header = details.source_name.clone();
        if let Some(title) = &details.section_title {
            header = format!("{} | {}", header, title);
        }
        lines.push(format!("[{}] {}", marker, header));
        lines.push(details.content.trim().to_string());
        lines.push(String::new());

        citations.push(Citation {
            marker,
            chunk_id: details.id.clone(),
            document_id: details.document_id.clone(),
            source_name: details.source_name.clone(),
            section_title: details.section_title.clone(),
            chunk_index: details.chunk_index,
        });
        chunks.push(RetrievedChunk {
            chunk_id: details.id.clone(),
            document_id: details.document_id.clone(),
            content: details.content.clone(),
            section_title: details.section_title.clone(),
            source_name: details.source_name.clone(),
        });
    }

    lines.push("</retrieved-context>".to_string());
    (lines.join("\n").trim().to_string(), citations, chunks)
}
