//! Lodestone CLI
//!
//! Host binary wiring the retrieval engine to the local filesystem.

use anyhow::Result;
use clap::Parser;
use lodestone_core::{
    Capabilities, Config, Engine, EngineConfig, EmbeddingClient, HttpEmbeddingProvider,
    SimpleRewriter, SystemClock,
};
use std::sync::Arc;

mod app;
mod commands;
mod converter;

use app::{Cli, Commands};
use converter::ExternalConverter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let engine = build_engine()?;

    let result = match cli.command {
        Commands::Ingest { file, workspace, session } => {
            commands::ingest::run(&engine, &file, workspace, session).await
        }
        Commands::Query { query, workspace, session } => {
            commands::query::run(&engine, query, workspace, session, cli.format).await
        }
        Commands::Enqueue { path } => commands::watch::enqueue(&engine, &path),
        Commands::Rescan { dir } => commands::watch::rescan(&engine, &dir).await,
        Commands::Watch => commands::watch::run(&engine).await,
        Commands::Registry { status } => commands::registry::run(&engine, status, cli.format),
        Commands::Cleanup { retention_days } => commands::cleanup::run(&engine, retention_days),
        Commands::Status => commands::status::run(&engine, cli.format),
    };

    engine.shutdown().await;
    result
}

fn build_engine() -> Result<Engine> {
    let config = Config::load()?;
    let settings = config.retrieval.clone();

    let db_path = std::env::var("LODESTONE_DB")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| config.resolved_db_path());
    let session_storage_dir = db_path
        .parent()
        .map(|parent| parent.join("sessions"))
        .unwrap_or_else(|| std::path::PathBuf::from("sessions"));

    let embedder = if settings.embedding_model.trim().is_empty() {
        None
    } else {
        let service = &config.embedding_service;
        let provider =
            HttpEmbeddingProvider::new(&service.url, service.api_key.clone(), service.timeout_secs)?;
        Some(Arc::new(EmbeddingClient::new(
            Arc::new(provider),
            &settings.embedding_model,
            service.api_key.is_some(),
        )))
    };

    let capabilities = Capabilities {
        embedder,
        rewriter: Some(Arc::new(SimpleRewriter)),
        reranker: None,
        converter: Arc::new(ExternalConverter::from_env()),
        clock: Arc::new(SystemClock::new()),
    };

    let engine_config = EngineConfig {
        db_path,
        session_storage_dir,
        watch_dir: config.watch_dir.clone(),
        settings,
        watcher: Default::default(),
        pool: Default::default(),
    };

    Ok(Engine::start(engine_config, capabilities)?)
}
