//! Shared test support: deterministic embedding stubs and seeding
//! helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use lodestone_core::{
    EmbeddingClient, EmbeddingProvider, IndexRequest, Result, RetrievalSettings, SourceType,
};
use std::sync::Arc;

pub const STUB_MODEL: &str = "stub-embed-v1";

/// Deterministic provider: the first configured needle contained in a
/// text decides its vector; everything else gets the fallback.
pub struct StubProvider {
    needles: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
}

impl StubProvider {
    pub fn new(needles: Vec<(&str, Vec<f32>)>, fallback: Vec<f32>) -> Self {
        Self {
            needles: needles
                .into_iter()
                .map(|(needle, vector)| (needle.to_string(), vector))
                .collect(),
            fallback,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    async fn embed_batch(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                self.needles
                    .iter()
                    .find(|(needle, _)| text.contains(needle.as_str()))
                    .map(|(_, vector)| vector.clone())
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }
}

pub fn stub_client(needles: Vec<(&str, Vec<f32>)>, fallback: Vec<f32>) -> Arc<EmbeddingClient> {
    Arc::new(EmbeddingClient::new(
        Arc::new(StubProvider::new(needles, fallback)),
        STUB_MODEL,
        true,
    ))
}

/// Client that short-circuits as unavailable (no api key)
pub fn unavailable_client() -> Arc<EmbeddingClient> {
    Arc::new(EmbeddingClient::new(
        Arc::new(StubProvider::new(Vec::new(), vec![1.0])),
        STUB_MODEL,
        false,
    ))
}

pub fn settings_with_embeddings() -> RetrievalSettings {
    RetrievalSettings {
        embedding_model: STUB_MODEL.to_string(),
        ..Default::default()
    }
}

pub fn request(
    workspace: &str,
    session: Option<&str>,
    source_name: &str,
    markdown: &str,
) -> IndexRequest {
    IndexRequest {
        workspace_id: workspace.to_string(),
        session_id: session.map(|s| s.to_string()),
        artifact_entry_id: None,
        source_type: SourceType::Artifact,
        source_name: source_name.to_string(),
        source_path: None,
        file_size: None,
        markdown: markdown.to_string(),
    }
}
