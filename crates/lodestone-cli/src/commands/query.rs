//! Query command

use crate::app::OutputFormat;
use anyhow::Result;
use lodestone_core::{Engine, Scope};

pub async fn run(
    engine: &Engine,
    query: Vec<String>,
    workspace: Option<String>,
    session: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let query = query.join(" ");
    let scope = match (workspace, session) {
        (_, Some(session_id)) => Scope::Session(session_id),
        (Some(workspace_id), None) => Scope::Workspace(workspace_id),
        (None, None) => Scope::Global,
    };

    let result = engine.retrieve(&query, scope).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Cli => {
            if !result.grounded {
                println!("No supporting passages found in scope '{}'.", result.used_scope);
                return Ok(());
            }
            println!("{}", result.context_text);
            println!();
            println!("Citations ({} scope):", result.used_scope);
            for citation in &result.citations {
                match &citation.section_title {
                    Some(title) => println!(
                        "  [{}] {} | {} (chunk {})",
                        citation.marker, citation.source_name, title, citation.chunk_index
                    ),
                    None => println!(
                        "  [{}] {} (chunk {})",
                        citation.marker, citation.source_name, citation.chunk_index
                    ),
                }
            }
        }
    }
    Ok(())
}
