//! Database layer for lodestone
//!
//! SQLite-backed storage with:
//! - FTS5 full-text index over chunks
//! - float32 BLOB embeddings with exact cosine scoring
//! - content-addressed document deduplication per workspace

mod chunks;
mod documents;
mod registry;
mod schema;
mod sessions;
mod stats;
pub mod vectors;

pub use chunks::{ChunkDetails, ChunkInput};
pub use documents::{DocumentInsert, DocumentRow, EmbeddingStatus};
pub use registry::{RegistryEntry, RegistryStatus};
pub use schema::Database;
pub use stats::IndexStats;
use std::path::PathBuf;

/// Sentinel workspace holding the shared corpus
pub const GLOBAL_WORKSPACE: &str = "GLOBAL";

impl Database {
    /// Get the default database path
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::DATA_DIR_NAME)
            .join("index.sqlite")
    }
}
