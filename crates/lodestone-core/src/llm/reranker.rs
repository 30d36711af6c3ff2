//! LLM-based reranking
//!
//! The model returns a JSON array of 1-based candidate indices ordered
//! best to worst. Any parse failure yields an error so the caller can
//! fall back to the heuristic reranker.

use super::traits::{LlmReranker, RerankDocument, RerankResult};
use crate::error::{LodestoneError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat-completion-backed reranker (OpenAI-compatible endpoint)
pub struct HttpLlmReranker {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpLlmReranker {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

fn build_prompt(query: &str, documents: &[RerankDocument]) -> String {
    let mut lines = vec![
        "You are reranking retrieved passages for relevance to the user query.".to_string(),
        "Return a JSON array of candidate indices (1-based) ordered from best to worst."
            .to_string(),
        "Do not include any extra text.".to_string(),
        String::new(),
        format!("Query: {}", query),
        String::new(),
        "Candidates:".to_string(),
    ];
    for (idx, doc) in documents.iter().enumerate() {
        lines.push(format!("[{}]\n{}", idx + 1, doc.text));
    }
    lines.join("\n")
}

/// Map a response like `[2, 1, 3]` onto descending scores
fn parse_order(documents: &[RerankDocument], response: &str) -> Result<Vec<RerankResult>> {
    let json_slice = match (response.find('['), response.rfind(']')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => {
            return Err(LodestoneError::Llm(
                "reranker response contained no JSON array".into(),
            ))
        }
    };

    let order: Vec<i64> = serde_json::from_str(json_slice)
        .map_err(|e| LodestoneError::Llm(format!("reranker returned invalid JSON: {}", e)))?;

    let mut results = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (rank, idx) in order.into_iter().enumerate() {
        let position = idx - 1;
        if position < 0 || position as usize >= documents.len() || !seen.insert(position) {
            continue;
        }
        results.push(RerankResult {
            id: documents[position as usize].id.clone(),
            score: 1.0 / (rank as f64 + 1.0),
        });
    }

    if results.is_empty() {
        return Err(LodestoneError::Llm(
            "reranker returned no usable ordering".into(),
        ));
    }
    Ok(results)
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmReranker for HttpLlmReranker {
    async fn rerank(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<RerankResult>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You output strict JSON arrays only.".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(query, documents),
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.http_client.post(&url).json(&request);
        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(LodestoneError::Llm(format!(
                "rerank service error (HTTP {})",
                response.status()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        parse_order(documents, content)
    }
}
