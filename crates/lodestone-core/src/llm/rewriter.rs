//! Query rewriting
//!
//! An LLM-backed rewriter produces up to three variants; any failure
//! falls back to the original query. A deterministic local rewrite is
//! used when no LLM service is configured.

use super::traits::QueryRewriter;
use crate::error::{LodestoneError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Variants returned per query, original included
pub const MAX_QUERY_VARIANTS: usize = 3;

/// Lowercase and strip punctuation; the fallback variant generator.
pub fn simple_rewrite(query: &str) -> String {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic rewriter used when no LLM service is configured
pub struct SimpleRewriter;

#[async_trait]
impl QueryRewriter for SimpleRewriter {
    async fn rewrite(&self, query: &str) -> Result<Vec<String>> {
        let rewritten = simple_rewrite(query);
        if rewritten.is_empty() || rewritten == query {
            Ok(vec![query.to_string()])
        } else {
            Ok(vec![query.to_string(), rewritten])
        }
    }
}

/// Chat-completion-backed rewriter (OpenAI-compatible endpoint)
pub struct HttpQueryRewriter {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpQueryRewriter {
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
impl QueryRewriter for HttpQueryRewriter {
    async fn rewrite(&self, query: &str) -> Result<Vec<String>> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "Rewrite search queries. Output ONLY a JSON array of 1-2 \
                              alternative phrasings of the query, no extra text."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: query.to_string(),
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
                "rewrite service error (HTTP {})",
                response.status()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();

        Ok(parse_variants(query, content))
    }
}

/// Parse a JSON array out of the model response; always returns the
/// original query first and at most [`MAX_QUERY_VARIANTS`] entries.
fn parse_variants(original: &str, response: &str) -> Vec<String> {
    let mut variants = vec![original.to_string()];

    let json_slice = match (response.find('['), response.rfind(']')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => return variants,
    };

    if let Ok(parsed) = serde_json::from_str::<Vec<String>>(json_slice) {
        for variant in parsed {
            let trimmed = variant.trim();
            if trimmed.is_empty() || variants.iter().any(|v| v == trimmed) {
                continue;
            }
            variants.push(trimmed.to_string());
            if variants.len() >= MAX_QUERY_VARIANTS {
                break;
            }
        }
    }

    variants
}
