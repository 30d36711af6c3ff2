//! Registry listing command

use crate::app::OutputFormat;
use anyhow::{bail, Result};
use lodestone_core::{Engine, RegistryStatus};

pub fn run(engine: &Engine, status: Option<String>, format: OutputFormat) -> Result<()> {
    let filter = match status.as_deref() {
        None => None,
        Some(value) => match RegistryStatus::parse(value) {
            Ok(status) => Some(status),
            Err(_) => bail!("unknown status '{}'; expected pending, indexed, failed or skipped", value),
        },
    };

    let entries = engine.list_registry(filter)?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = entries
                .iter()
                .map(|entry| {
                    serde_json::json!({
                        "source_path": entry.source_path,
                        "content_hash": entry.content_hash,
                        "status": entry.status.as_str(),
                        "retry_count": entry.retry_count,
                        "last_seen_at": entry.last_seen_at.map(|dt| dt.to_rfc3339()),
                        "last_indexed_at": entry.last_indexed_at.map(|dt| dt.to_rfc3339()),
                        "error_message": entry.error_message,
                        "embedding_model": entry.embedding_model,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Cli => {
            if entries.is_empty() {
                println!("Registry is empty.");
                return Ok(());
            }
            for entry in entries {
                let mut line = format!("{:8} {}", entry.status.as_str(), entry.source_path);
                if entry.retry_count > 0 {
                    line.push_str(&format!(" (retries: {})", entry.retry_count));
                }
                if let Some(error) = entry.error_message {
                    line.push_str(&format!(" [{}]", error));
                }
                println!("{}", line);
            }
        }
    }
    Ok(())
}
