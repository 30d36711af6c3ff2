//! Ingest command

use anyhow::{Context, Result};
use lodestone_core::{Engine, IndexRequest, SourceType, GLOBAL_WORKSPACE};
use std::path::Path;

pub async fn run(
    engine: &Engine,
    file: &Path,
    workspace: Option<String>,
    session: Option<String>,
) -> Result<()> {
    let markdown = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let source_name = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string_lossy().to_string());
    let file_size = std::fs::metadata(file).map(|m| m.len() as i64).ok();

    let outcome = engine
        .index_document(IndexRequest {
            workspace_id: workspace.unwrap_or_else(|| GLOBAL_WORKSPACE.to_string()),
            session_id: session,
            artifact_entry_id: None,
            source_type: SourceType::Artifact,
            source_name,
            source_path: Some(file.to_string_lossy().to_string()),
            file_size,
            markdown,
        })
        .await?;

    if outcome.skipped {
        println!("Already indexed as {} (unchanged)", outcome.document_id);
    } else {
        println!(
            "Indexed {} ({} chunks, embeddings: {})",
            outcome.document_id,
            outcome.chunk_count,
            outcome.embedding_status.as_str()
        );
    }
    if let Some(warning) = outcome.embedding_warning {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}
