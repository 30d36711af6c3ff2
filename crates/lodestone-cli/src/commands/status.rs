//! Status command

use crate::app::OutputFormat;
use anyhow::Result;
use lodestone_core::{Database, Engine};

pub fn run(engine: &Engine, format: OutputFormat) -> Result<()> {
    let db = Database::open(engine.db_path())?;
    let stats = db.stats()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Cli => {
            println!("Workspaces:      {}", stats.workspace_count);
            println!("Documents:       {}", stats.document_count);
            println!("  Stale:         {}", stats.stale_document_count);
            println!("Chunks:          {}", stats.chunk_count);
            println!("Embeddings:      {}", stats.embedding_count);
            if !stats.registry_counts.is_empty() {
                println!("Registry:");
                for (status, count) in &stats.registry_counts {
                    println!("  {:8} {}", status, count);
                }
            }
        }
    }
    Ok(())
}
