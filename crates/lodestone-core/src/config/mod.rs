//! Configuration management

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Chunk size bounds enforced on snapshots (characters)
pub const CHUNK_SIZE_MIN: usize = 200;
pub const CHUNK_SIZE_MAX: usize = 5000;
pub const CHUNK_OVERLAP_MAX: usize = 1000;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database file location; defaults next to the config dir
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Directory watched for new documents
    #[serde(default)]
    pub watch_dir: Option<PathBuf>,

    /// Retrieval and indexing settings snapshot
    #[serde(default)]
    pub retrieval: RetrievalSettings,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding_service: EmbeddingServiceConfig,
}

/// Runtime settings consumed read-only by the retrieval pipeline.
///
/// A snapshot is taken per request; mid-request settings changes never
/// affect an in-flight retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalSettings {
    /// Master switch; when off the decision subgraph always skips
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Preferred scope when no session binds the request: "global" or "workspace"
    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size_chars: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap_chars: usize,

    #[serde(default = "default_k")]
    pub k_lex: usize,

    #[serde(default = "default_k")]
    pub k_vec: usize,

    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,

    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    #[serde(default = "default_max_context_chunks")]
    pub max_context_chunks: usize,

    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Embedding model identifier; empty disables the vector path
    #[serde(default)]
    pub embedding_model: String,

    #[serde(default)]
    pub enable_query_rewrite: bool,

    #[serde(default)]
    pub enable_llm_rerank: bool,

    /// Lightweight "should retrieve" classifier (greeting bypass)
    #[serde(default = "default_enabled")]
    pub enable_skip_classifier: bool,

    /// Age at which stale session documents become collectable
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Cleanup timer period
    #[serde(default = "default_cleanup_interval_hours")]
    pub cleanup_interval_hours: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: default_scope(),
            chunk_size_chars: default_chunk_size(),
            chunk_overlap_chars: default_chunk_overlap(),
            k_lex: default_k(),
            k_vec: default_k(),
            rrf_k: default_rrf_k(),
            max_candidates: default_max_candidates(),
            max_context_chunks: default_max_context_chunks(),
            max_context_chars: default_max_context_chars(),
            embedding_model: String::new(),
            enable_query_rewrite: false,
            enable_llm_rerank: false,
            enable_skip_classifier: true,
            retention_days: default_retention_days(),
            cleanup_interval_hours: default_cleanup_interval_hours(),
        }
    }
}

impl RetrievalSettings {
    /// Chunk size clamped into the supported range
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size_chars.clamp(CHUNK_SIZE_MIN, CHUNK_SIZE_MAX)
    }

    /// Overlap clamped below the chunk size
    pub fn effective_chunk_overlap(&self) -> usize {
        self.chunk_overlap_chars
            .min(CHUNK_OVERLAP_MAX)
            .min(self.effective_chunk_size().saturating_sub(1))
    }
}

/// Embedding service configuration (OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingServiceConfig {
    /// Base URL of the embeddings endpoint
    pub url: String,

    /// API key; absent means the vector path is unavailable
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("LODESTONE_EMBEDDING_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string()),
            api_key: std::env::var("LODESTONE_API_KEY").ok(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_scope() -> String {
    "global".to_string()
}

fn default_chunk_size() -> usize {
    1200
}

fn default_chunk_overlap() -> usize {
    150
}

fn default_k() -> usize {
    8
}

fn default_rrf_k() -> usize {
    60
}

fn default_max_candidates() -> usize {
    12
}

fn default_max_context_chunks() -> usize {
    6
}

fn default_max_context_chars() -> usize {
    8000
}

fn default_retention_days() -> i64 {
    7
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load config from the default path, or defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Resolve the database path
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(crate::db::Database::default_path)
    }
}
