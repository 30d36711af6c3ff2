//! Capability trait definitions
//!
//! The engine consumes these; hosts plug in HTTP-backed or stub
//! implementations.

use crate::error::Result;
use async_trait::async_trait;

/// Maps text batches to fixed-dimension float vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts under the given model
    async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Converts a PDF on disk to markdown text
pub trait MarkdownConverter: Send + Sync {
    /// Returns `(markdown_text, source_name)`
    fn convert(&self, path: &std::path::Path) -> Result<(String, String)>;
}

/// Produces 1..3 query variants; failure falls back to the original
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, query: &str) -> Result<Vec<String>>;
}

/// Candidate passed to the LLM reranker
#[derive(Debug, Clone)]
pub struct RerankDocument {
    pub id: String,
    pub text: String,
}

/// Reranker output: the input set, reordered
#[derive(Debug, Clone)]
pub struct RerankResult {
    pub id: String,
    pub score: f64,
}

/// Reorders retrieval candidates by relevance to the query
#[async_trait]
pub trait LlmReranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<RerankResult>>;
}
