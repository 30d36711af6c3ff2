//! Hybrid retrieval pipeline
//!
//! lexical ∥ vector → RRF → rerank → dedup → context. The database
//! connection is scoped to the synchronous gather phase; embedding and
//! LLM rerank I/O happen outside it. Every capped candidate is audited
//! against the scope predicate before it can reach the output.

use super::rrf::FusedHit;
use super::{
    build_context, heuristic_rerank, rrf_fuse, select_context_chunks, vector_search, Candidate,
    RankedHit, RetrievalDebug, RetrievalResult, Scope,
};
use crate::clock::Clock;
use crate::config::RetrievalSettings;
use crate::db::{ChunkDetails, Database};
use crate::error::{LodestoneError, Result};
use crate::llm::{EmbeddingClient, LlmReranker, RerankDocument};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Soft deadline; on overrun the pipeline returns what it has
const RETRIEVAL_DEADLINE: Duration = Duration::from_secs(10);

/// Inputs to a retrieval run
#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub query: String,
    /// Rewrite variants; the original query is always searched
    pub variants: Vec<String>,
    pub scope: Scope,
}

struct GatherOutput {
    capped: Vec<FusedHit>,
    details: HashMap<String, ChunkDetails>,
    lexical_scores: HashMap<String, f64>,
    vector_scores: HashMap<String, f64>,
    lexical_candidates: usize,
    vector_candidates: usize,
    fused_total: usize,
}

/// Run the full retrieval pipeline against the database at `db_path`.
pub async fn retrieve(
    db_path: &Path,
    req: &RetrieveRequest,
    settings: &RetrievalSettings,
    embedder: Option<&EmbeddingClient>,
    reranker: Option<&dyn LlmReranker>,
    clock: &dyn Clock,
) -> Result<RetrievalResult> {
    if req.query.trim().is_empty() {
        return Err(LodestoneError::InvalidInput("empty query".into()));
    }
    req.scope.validate()?;

    let deadline = clock.monotonic() + RETRIEVAL_DEADLINE;
    let mut debug = RetrievalDebug::default();

    let mut variants: Vec<String> = vec![req.query.clone()];
    for variant in &req.variants {
        let trimmed = variant.trim();
        if !trimmed.is_empty() && !variants.iter().any(|v| v == trimmed) {
            variants.push(trimmed.to_string());
        }
    }
    variants.truncate(crate::llm::MAX_QUERY_VARIANTS);

    // Query vectors come first so no connection is held across
    // provider I/O.
    let vector_path = settings.k_vec > 0
        && !settings.embedding_model.trim().is_empty()
        && embedder.map(|e| e.is_available()).unwrap_or(false);

    let mut query_vectors: Vec<(usize, Vec<f32>)> = Vec::new();
    if vector_path {
        let client = embedder.expect("embedder present for vector path");
        for (idx, variant) in variants.iter().enumerate() {
            match client.embed_query(variant).await {
                Ok(vector) => query_vectors.push((idx, vector)),
                Err(LodestoneError::EmbeddingUnavailable(reason)) => {
                    debug.notes.push(format!("vector path unavailable: {}", reason));
                    break;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "query embedding failed, continuing lexically");
                    debug
                        .notes
                        .push(format!("query embedding failed: {}", err));
                    break;
                }
            }
        }
    }

    let gathered = {
        let db = Database::open(db_path)?;
        gather_candidates(&db, req, settings, &variants, &query_vectors, clock, deadline, &mut debug)?
    };

    debug.lexical_candidates = gathered.lexical_candidates;
    debug.vector_candidates = gathered.vector_candidates;
    debug.fused_candidates = gathered.fused_total;
    debug.selected_candidates = gathered.capped.len();

    let mut candidates: Vec<Candidate> = gathered
        .capped
        .iter()
        .map(|fused| Candidate {
            chunk_id: fused.chunk_id.clone(),
            fused_score: fused.score,
            lexical_score: gathered.lexical_scores.get(&fused.chunk_id).copied(),
            vector_score: gathered.vector_scores.get(&fused.chunk_id).copied(),
            rerank_score: fused.score,
        })
        .collect();

    candidates = rerank_candidates(
        candidates,
        &gathered.details,
        req,
        settings,
        reranker,
        clock,
        deadline,
        &mut debug,
    )
    .await;

    let selected = select_context_chunks(
        &candidates,
        &gathered.details,
        settings.max_context_chunks,
        settings.max_context_chars,
    );
    let (context_text, citations, chunks) = build_context(&selected, &gathered.details);

    debug.context_chunks = selected.len();
    if clock.monotonic() > deadline {
        debug.deadline_exceeded = true;
    }

    let grounded = !chunks.is_empty();
    if !grounded {
        debug.notes.push(super::UNGROUNDED_GUIDANCE.to_string());
    }

    Ok(RetrievalResult {
        chunks,
        context_text,
        citations,
        used_scope: req.scope.label().to_string(),
        grounded,
        debug,
    })
}

#[allow(clippy::too_many_arguments)]
fn gather_candidates(
    db: &Database,
    req: &RetrieveRequest,
    settings: &RetrievalSettings,
    variants: &[String],
    query_vectors: &[(usize, Vec<f32>)],
    clock: &dyn Clock,
    deadline: Duration,
    debug: &mut RetrievalDebug,
) -> Result<GatherOutput> {
    let mut lists: Vec<Vec<RankedHit>> = Vec::new();
    let mut lexical_scores: HashMap<String, f64> = HashMap::new();
    let mut vector_scores: HashMap<String, f64> = HashMap::new();
    let mut lexical_candidates = 0;
    let mut vector_candidates = 0;

    for variant in variants {
        let hits = db.search_lexical(variant, &req.scope, settings.k_lex)?;
        lexical_candidates += hits.len();
        for hit in &hits {
            // bm25 is smaller-is-better; keep the best (minimum)
            lexical_scores
                .entry(hit.chunk_id.clone())
                .and_modify(|score| *score = score.min(hit.score))
                .or_insert(hit.score);
        }
        lists.push(hits);
    }

    if !query_vectors.is_empty() {
        if clock.monotonic() > deadline {
            debug.deadline_exceeded = true;
            debug.notes.push("deadline hit before vector search".into());
        } else {
            let stored = db.load_scope_embeddings(&req.scope, &settings.embedding_model)?;
            for (_, query_vector) in query_vectors {
                let hits = vector_search(&stored, query_vector, settings.k_vec);
                vector_candidates += hits.len();
                for hit in &hits {
                    vector_scores
                        .entry(hit.chunk_id.clone())
                        .and_modify(|score| *score = score.max(hit.score))
                        .or_insert(hit.score);
                }
                lists.push(hits);
            }
        }
    }

    let fused = rrf_fuse(&lists, settings.rrf_k);
    let fused_total = fused.len();
    let capped: Vec<FusedHit> = fused.into_iter().take(settings.max_candidates).collect();

    let ids: Vec<String> = capped.iter().map(|f| f.chunk_id.clone()).collect();
    let details: HashMap<String, ChunkDetails> = db
        .get_chunk_details(&ids)?
        .into_iter()
        .map(|d| (d.id.clone(), d))
        .collect();

    audit_scope(db, &req.scope, &details)?;

    Ok(GatherOutput {
        capped,
        details,
        lexical_scores,
        vector_scores,
        lexical_candidates,
        vector_candidates,
        fused_total,
    })
}

/// A candidate outside the requested scope is a fatal invariant
/// breach, not a filterable condition.
fn audit_scope(
    db: &Database,
    scope: &Scope,
    details: &HashMap<String, ChunkDetails>,
) -> Result<()> {
    for chunk in details.values() {
        let in_scope = match scope {
            Scope::Global => chunk.workspace_id == crate::db::GLOBAL_WORKSPACE,
            Scope::Workspace(id) => &chunk.workspace_id == id,
            Scope::Session(id) => db.document_linked_to_session(&chunk.document_id, id)?,
        };
        if !in_scope {
            return Err(LodestoneError::Integrity(format!(
                "chunk {} of document {} escaped scope {}",
                chunk.id,
                chunk.document_id,
                scope.label()
            )));
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn rerank_candidates(
    candidates: Vec<Candidate>,
    details: &HashMap<String, ChunkDetails>,
    req: &RetrieveRequest,
    settings: &RetrievalSettings,
    reranker: Option<&dyn LlmReranker>,
    clock: &dyn Clock,
    deadline: Duration,
    debug: &mut RetrievalDebug,
) -> Vec<Candidate> {
    if candidates.is_empty() {
        return candidates;
    }

    if settings.enable_llm_rerank && clock.monotonic() <= deadline {
        if let Some(reranker) = reranker {
            let documents: Vec<RerankDocument> = candidates
                .iter()
                .filter_map(|c| {
                    details.get(&c.chunk_id).map(|d| RerankDocument {
                        id: c.chunk_id.clone(),
                        text: d.content.clone(),
                    })
                })
                .collect();

            match reranker.rerank(&req.query, &documents).await {
                Ok(order) if !order.is_empty() => {
                    return apply_llm_order(candidates, &order);
                }
                Ok(_) => {
                    debug.notes.push("llm rerank returned nothing, using heuristic".into());
                }
                Err(err) => {
                    tracing::warn!(error = %err, "llm rerank failed, using heuristic");
                    debug.notes.push(format!("llm rerank failed: {}", err));
                }
            }
        }
    }

    heuristic_rerank(candidates, details, &req.scope)
}

/// Returned ids lead in the model's order; unmentioned candidates keep
/// their fused order behind them.
fn apply_llm_order(
    candidates: Vec<Candidate>,
    order: &[crate::llm::RerankResult],
) -> Vec<Candidate> {
    let mut by_id: HashMap<String, Candidate> = candidates
        .iter()
        .map(|c| (c.chunk_id.clone(), c.clone()))
        .collect();

    let mut reordered = Vec::with_capacity(candidates.len());
    for result in order {
        if let Some(mut candidate) = by_id.remove(&result.id) {
            candidate.rerank_score = result.score;
            reordered.push(candidate);
        }
    }
    for candidate in candidates {
        if by_id.remove(&candidate.chunk_id).is_some() {
            reordered.push(candidate);
        }
    }
    reordered
}
