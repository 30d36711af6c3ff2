//! Engine coordinator
//!
//! Owns the capability set, caches, worker pool, watcher and cleanup
//! service, and exposes the engine's external operations. There is no
//! global state: everything the pipelines need is handed to them from
//! here, and database connections live only as long as one operation
//! or worker task.

use crate::cache::EngineCaches;
use crate::cleanup::{self, CleanupService};
use crate::clock::{Clock, SystemClock};
use crate::config::RetrievalSettings;
use crate::db::{Database, RegistryEntry, RegistryStatus};
use crate::error::{LodestoneError, Result};
use crate::graph::{run_subgraph, CancelToken, GraphContext, GraphInput, GraphState};
use crate::index::pool::{IndexJob, IndexPool, JobRuntime, PoolConfig, PoolEvent};
use crate::index::{self, IndexOutcome, IndexRequest};
use crate::llm::{EmbeddingClient, LlmReranker, MarkdownConverter, QueryRewriter};
use crate::search::{self, RetrievalResult, RetrieveRequest, Scope};
use crate::watch::{self, Watcher, WatcherConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Engine-level configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    /// Where session uploads are copied; cleanup may delete under here
    pub session_storage_dir: PathBuf,
    pub watch_dir: Option<PathBuf>,
    pub settings: RetrievalSettings,
    pub watcher: WatcherConfig,
    pub pool: PoolConfig,
}

/// Consumed capabilities; absent ones degrade the matching feature
pub struct Capabilities {
    pub embedder: Option<Arc<EmbeddingClient>>,
    pub rewriter: Option<Arc<dyn QueryRewriter>>,
    pub reranker: Option<Arc<dyn LlmReranker>>,
    pub converter: Arc<dyn MarkdownConverter>,
    pub clock: Arc<dyn Clock>,
}

impl Capabilities {
    /// Lexical-only capability set with a converter only
    pub fn minimal(converter: Arc<dyn MarkdownConverter>) -> Self {
        Self {
            embedder: None,
            rewriter: None,
            reranker: None,
            converter,
            clock: Arc::new(SystemClock::new()),
        }
    }
}

/// The retrieval engine
pub struct Engine {
    config: EngineConfig,
    capabilities: Capabilities,
    caches: Arc<EngineCaches>,
    pool: Arc<IndexPool>,
    watcher: Mutex<Option<Watcher>>,
    cleanup: Mutex<Option<CleanupService>>,
}

impl Engine {
    /// Initialize storage and spawn the worker pool.
    ///
    /// Must run inside a tokio runtime.
    pub fn start(config: EngineConfig, capabilities: Capabilities) -> Result<Self> {
        {
            let db = Database::open(&config.db_path)?;
            db.initialize()?;
        }
        std::fs::create_dir_all(&config.session_storage_dir)?;

        let caches = Arc::new(EngineCaches::default());
        let runtime = Arc::new(JobRuntime {
            db_path: config.db_path.clone(),
            settings: config.settings.clone(),
            converter: capabilities.converter.clone(),
            embedder: capabilities.embedder.clone(),
            caches: caches.clone(),
            clock: capabilities.clock.clone(),
        });
        let pool = Arc::new(IndexPool::start(config.pool.clone(), runtime));

        Ok(Self {
            config,
            capabilities,
            caches,
            pool,
            watcher: Mutex::new(None),
            cleanup: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.config.settings
    }

    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    /// Index markdown content directly (artifact or converted PDF)
    pub async fn index_document(&self, req: IndexRequest) -> Result<IndexOutcome> {
        index::index_document(
            &self.config.db_path,
            req,
            &self.config.settings,
            self.capabilities.embedder.as_deref(),
            Some(&self.caches),
            self.capabilities.clock.as_ref(),
        )
        .await
    }

    /// Run the retrieval pipeline directly under an explicit scope
    pub async fn retrieve(&self, query: &str, scope: Scope) -> Result<RetrievalResult> {
        let request = RetrieveRequest {
            query: query.to_string(),
            variants: Vec::new(),
            scope,
        };
        search::retrieve(
            &self.config.db_path,
            &request,
            &self.config.settings,
            self.capabilities.embedder.as_deref(),
            self.capabilities.reranker.as_deref(),
            self.capabilities.clock.as_ref(),
        )
        .await
    }

    /// Run the full decision subgraph for a conversation turn
    pub async fn decide_and_retrieve(
        &self,
        input: &GraphInput,
        cancel: &CancelToken,
    ) -> Result<GraphState> {
        let ctx = GraphContext {
            db_path: self.config.db_path.clone(),
            settings: &self.config.settings,
            embedder: self.capabilities.embedder.as_deref(),
            rewriter: self.capabilities.rewriter.as_deref(),
            reranker: self.capabilities.reranker.as_deref(),
            clock: self.capabilities.clock.as_ref(),
            cancel,
        };
        run_subgraph(input, &ctx).await
    }

    /// Queue a single file for indexing; fails fast when the queue is
    /// full. Returns the registry key (the path itself).
    pub fn enqueue_file(&self, path: &Path) -> Result<String> {
        if !path.is_absolute() {
            return Err(LodestoneError::PathInvalid(format!(
                "path must be absolute: {}",
                path.display()
            )));
        }
        let metadata = std::fs::metadata(path)
            .map_err(|_| LodestoneError::PathInvalid(format!("file not found: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(LodestoneError::PathInvalid(format!(
                "not a file: {}",
                path.display()
            )));
        }

        let file_hash = index::hash_file(path)?;
        let path_str = path.to_string_lossy().to_string();
        let now = self.capabilities.clock.now();
        {
            let db = Database::open(&self.config.db_path)?;
            db.upsert_registry_entry(&RegistryEntry {
                source_path: path_str.clone(),
                content_hash: file_hash.clone(),
                status: RegistryStatus::Pending,
                retry_count: 0,
                last_seen_at: Some(now),
                last_indexed_at: None,
                error_message: None,
                embedding_model: None,
            })?;
        }

        self.pool.try_enqueue(IndexJob {
            source_path: path.to_path_buf(),
            file_hash,
            file_size: metadata.len(),
            attempt: 0,
            session_id: None,
            workspace_id: crate::db::GLOBAL_WORKSPACE.to_string(),
        })?;
        Ok(path_str)
    }

    /// Walk a directory once, enqueueing new or changed files
    pub async fn rescan(&self, dir: &Path) -> Result<usize> {
        watch::rescan(
            &self.config.db_path,
            &self.pool,
            self.capabilities.clock.as_ref(),
            dir,
            &self.config.watcher.patterns,
        )
        .await
    }

    pub fn list_registry(&self, status: Option<RegistryStatus>) -> Result<Vec<RegistryEntry>> {
        let db = Database::open(&self.config.db_path)?;
        db.list_registry_entries(status)
    }

    /// Remove stale session documents now
    pub fn cleanup_stale(&self, retention_days_override: Option<i64>) -> Result<usize> {
        cleanup::cleanup_stale(
            &self.config.db_path,
            retention_days_override.unwrap_or(self.config.settings.retention_days),
            &self.config.session_storage_dir,
            self.capabilities.clock.as_ref(),
        )
    }

    /// Tombstone a closing session's documents for later cleanup
    pub fn mark_session_stale(&self, session_id: &str) -> Result<usize> {
        let db = Database::open(&self.config.db_path)?;
        db.mark_session_documents_stale(session_id, self.capabilities.clock.now())
    }

    /// Subscribe to pool events (job started/completed/failed)
    pub fn subscribe_index_events(&self) -> tokio::sync::broadcast::Receiver<PoolEvent> {
        self.pool.subscribe()
    }

    /// Subscribe to timer-driven cleanup completions; `None` until the
    /// cleanup timer has been started.
    pub async fn subscribe_cleanup_events(
        &self,
    ) -> Option<tokio::sync::broadcast::Receiver<crate::cleanup::CleanupEvent>> {
        self.cleanup.lock().await.as_ref().map(|service| service.subscribe())
    }

    /// Start watching the configured directory
    pub async fn start_watcher(&self) -> Result<()> {
        let dir = self
            .config
            .watch_dir
            .clone()
            .ok_or_else(|| LodestoneError::PathInvalid("no watch directory configured".into()))?;
        let mut guard = self.watcher.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let watcher = Watcher::start(
            dir,
            self.config.watcher.clone(),
            self.config.db_path.clone(),
            self.pool.clone(),
            self.capabilities.clock.clone(),
        )?;
        *guard = Some(watcher);
        Ok(())
    }

    /// Start the periodic cleanup timer
    pub async fn start_cleanup_timer(&self) {
        let mut guard = self.cleanup.lock().await;
        if guard.is_some() {
            return;
        }
        let interval =
            Duration::from_secs(self.config.settings.cleanup_interval_hours.max(1) * 3600);
        *guard = Some(CleanupService::start(
            self.config.db_path.clone(),
            self.config.session_storage_dir.clone(),
            self.config.settings.retention_days,
            interval,
            self.capabilities.clock.clone(),
        ));
    }

    /// Stop background tasks; in-flight jobs finish first
    pub async fn shutdown(self) {
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.stop().await;
        }
        if let Some(cleanup) = self.cleanup.lock().await.take() {
            cleanup.stop().await;
        }
        if let Ok(pool) = Arc::try_unwrap(self.pool) {
            pool.shutdown().await;
        }
    }
}
