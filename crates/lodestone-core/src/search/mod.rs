//! Retrieval pipeline
//!
//! Scope-enforced lexical and vector search fused via Reciprocal Rank
//! Fusion, reranked, deduplicated and assembled into a cited context
//! block.

mod context;
mod hybrid;
mod lexical;
mod rerank;
mod rrf;
mod sanitize;
mod vector;

pub use context::{build_context, select_context_chunks};
pub use hybrid::{retrieve, RetrieveRequest};
pub use rerank::heuristic_rerank;
pub use rrf::{rrf_fuse, FusedHit};
pub use sanitize::sanitize_fts_query;
pub use vector::vector_search;

use crate::error::{LodestoneError, Result};
use serde::Serialize;

/// Predicate restricting which documents participate in a retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The shared corpus under the GLOBAL workspace
    Global,
    Workspace(String),
    Session(String),
}

impl Scope {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Workspace(_) => "workspace",
            Self::Session(_) => "session",
        }
    }

    /// Reject scopes with empty identifiers before any query runs
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Global => Ok(()),
            Self::Workspace(id) if id.trim().is_empty() => Err(LodestoneError::ScopeInvalid(
                "workspace scope requires an id".into(),
            )),
            Self::Session(id) if id.trim().is_empty() => Err(LodestoneError::ScopeInvalid(
                "session scope requires an id".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// One entry of a ranked hit list (lexical or vector)
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub chunk_id: String,
    pub chunk_index: i64,
    pub score: f64,
}

/// Fused candidate flowing through rerank and selection
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk_id: String,
    pub fused_score: f64,
    pub lexical_score: Option<f64>,
    pub vector_score: Option<f64>,
    pub rerank_score: f64,
}

/// Chunk as returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub section_title: Option<String>,
    pub source_name: String,
}

/// Maps a context marker `[n]` back to its chunk
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub marker: usize,
    pub chunk_id: String,
    pub document_id: String,
    pub source_name: String,
    pub section_title: Option<String>,
    pub chunk_index: i64,
}

/// Pipeline counters surfaced for debugging
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalDebug {
    pub lexical_candidates: usize,
    pub vector_candidates: usize,
    pub fused_candidates: usize,
    pub selected_candidates: usize,
    pub context_chunks: usize,
    pub deadline_exceeded: bool,
    pub notes: Vec<String>,
}

/// Guidance returned with ungrounded results
pub const UNGROUNDED_GUIDANCE: &str =
    "No supporting passages were found. Broaden the scope or add documents to the corpus.";

/// Result of a retrieval run
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
    pub context_text: String,
    pub citations: Vec<Citation>,
    pub used_scope: String,
    pub grounded: bool,
    pub debug: RetrievalDebug,
}

impl RetrievalResult {
    /// Empty, ungrounded result for skipped or fruitless retrievals
    pub fn empty(used_scope: &str) -> Self {
        Self {
            chunks: Vec::new(),
            context_text: String::new(),
            citations: Vec::new(),
            used_scope: used_scope.to_string(),
            grounded: false,
            debug: RetrievalDebug::default(),
        }
    }
}
