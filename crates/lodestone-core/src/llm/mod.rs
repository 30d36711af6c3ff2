//! External model capabilities
//!
//! Traits for the embedding provider, query rewriter and reranker,
//! plus HTTP implementations against OpenAI-compatible endpoints.

mod embedder;
mod reranker;
mod rewriter;
mod traits;

pub use embedder::{EmbeddingClient, HttpEmbeddingProvider, EMBED_BATCH_SIZE};
pub use reranker::HttpLlmReranker;
pub use rewriter::{simple_rewrite, HttpQueryRewriter, SimpleRewriter, MAX_QUERY_VARIANTS};
pub use traits::{
    EmbeddingProvider, LlmReranker, MarkdownConverter, QueryRewriter, RerankDocument, RerankResult,
};
