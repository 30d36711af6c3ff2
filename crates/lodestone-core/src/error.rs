//! Error types for lodestone

use thiserror::Error;

/// Result type alias using LodestoneError
pub type Result<T> = std::result::Result<T, LodestoneError>;

/// Error type alias for convenience
pub type Error = LodestoneError;

/// Main error type for the retrieval engine
#[derive(Debug, Error)]
pub enum LodestoneError {
    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Storage initialization failed: {0}")]
    StorageInit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Invalid scope: {0}")]
    ScopeInvalid(String),

    #[error("Invalid path: {0}")]
    PathInvalid(String),

    #[error("Indexing queue is full")]
    QueueFull,

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Data integrity violation: {0}")]
    Integrity(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LodestoneError {
    /// Whether a retry with backoff may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Storage(rusqlite::Error::SqliteFailure(code, _)) => {
                matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
            }
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transient() {
        assert!(LodestoneError::Timeout("indexing".into()).is_transient());
        assert!(!LodestoneError::QueueFull.is_transient());
        assert!(!LodestoneError::ScopeInvalid("session".into()).is_transient());
    }
}
