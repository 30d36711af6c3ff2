//! CLI argument definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lodestone")]
#[command(
    author,
    version,
    about = "Hybrid lexical + vector retrieval over your local documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index a markdown file directly
    Ingest {
        /// Markdown file to index
        file: PathBuf,

        /// Target workspace (defaults to the shared GLOBAL corpus)
        #[arg(long)]
        workspace: Option<String>,

        /// Attach the document to a session (local scope)
        #[arg(long)]
        session: Option<String>,
    },

    /// Hybrid retrieval with citations
    Query {
        /// Search query
        query: Vec<String>,

        /// Restrict to a workspace
        #[arg(long, conflicts_with = "session")]
        workspace: Option<String>,

        /// Restrict to a session's documents
        #[arg(long)]
        session: Option<String>,
    },

    /// Queue one file for background indexing
    Enqueue {
        /// Absolute path to the file
        path: PathBuf,
    },

    /// Walk a directory once and queue new or changed files
    Rescan {
        /// Directory to scan
        dir: PathBuf,
    },

    /// Watch the configured directory until interrupted
    Watch,

    /// List watched-path registry entries
    Registry {
        /// Filter by status (pending, indexed, failed, skipped)
        #[arg(long)]
        status: Option<String>,
    },

    /// Remove stale session documents
    Cleanup {
        /// Override the configured retention window
        #[arg(long)]
        retention_days: Option<i64>,
    },

    /// Show index statistics
    Status,
}
