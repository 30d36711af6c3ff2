//! Indexing worker pool
//!
//! A bounded queue feeds a fixed set of workers. Producers block when
//! the queue is full, throttling bulk imports. Each job carries a hard
//! deadline; failures update the registry and re-enqueue with
//! exponential backoff until the retry budget is spent.

use crate::cache::EngineCaches;
use crate::clock::Clock;
use crate::config::RetrievalSettings;
use crate::db::{Database, RegistryEntry, RegistryStatus};
use crate::error::{LodestoneError, Result};
use crate::index::{self, IndexRequest, SourceType};
use crate::llm::{EmbeddingClient, MarkdownConverter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

/// Configuration for the indexing pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Bounded queue depth; senders block when full
    pub queue_capacity: usize,
    /// Jobs running at once
    pub max_concurrent_jobs: usize,
    /// Per-document deadline
    pub job_timeout: Duration,
    /// Attempts before a path is marked failed for good
    pub max_retries: i64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            max_concurrent_jobs: 5,
            job_timeout: Duration::from_secs(300),
            max_retries: 3,
        }
    }
}

/// One file queued for indexing
#[derive(Debug, Clone)]
pub struct IndexJob {
    pub source_path: PathBuf,
    /// Hash of the file bytes, computed by the enqueuing side
    pub file_hash: String,
    pub file_size: u64,
    /// Retries already consumed
    pub attempt: i64,
    pub session_id: Option<String>,
    pub workspace_id: String,
}

/// Event emitted by the pool
#[derive(Debug, Clone)]
pub enum PoolEvent {
    JobStarted { path: PathBuf },
    JobCompleted { path: PathBuf, document_id: String },
    JobFailed { path: PathBuf, error: String, will_retry: bool },
}

/// Shared dependencies for job execution
pub struct JobRuntime {
    pub db_path: PathBuf,
    pub settings: RetrievalSettings,
    pub converter: Arc<dyn MarkdownConverter>,
    pub embedder: Option<Arc<EmbeddingClient>>,
    pub caches: Arc<EngineCaches>,
    pub clock: Arc<dyn Clock>,
}

/// Handle over the running pool
pub struct IndexPool {
    tx: mpsc::Sender<IndexJob>,
    events: broadcast::Sender<PoolEvent>,
    workers: Vec<JoinHandle<()>>,
}

impl IndexPool {
    /// Spawn the workers and return the pool handle
    pub fn start(config: PoolConfig, runtime: Arc<JobRuntime>) -> Self {
        let (tx, rx) = mpsc::channel::<IndexJob>(config.queue_capacity.max(1));
        let (events, _) = broadcast::channel(256);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::new();
        for worker_id in 0..config.max_concurrent_jobs.max(1) {
            let rx = rx.clone();
            let runtime = runtime.clone();
            let events = events.clone();
            let retry_tx = tx.clone();
            let config = config.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(job) = job else {
                        tracing::debug!(worker_id, "index worker shutting down");
                        break;
                    };
                    process_job(&runtime, &config, &events, &retry_tx, job).await;
                }
            }));
        }

        Self { tx, events, workers }
    }

    /// Non-blocking enqueue; fails fast when the queue is full
    pub fn try_enqueue(&self, job: IndexJob) -> Result<()> {
        self.tx.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => LodestoneError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => {
                LodestoneError::Integrity("index pool is stopped".into())
            }
        })
    }

    /// Blocking enqueue used by the watcher; applies backpressure
    pub async fn enqueue(&self, job: IndexJob) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| LodestoneError::Integrity("index pool is stopped".into()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Close the queue and wait for in-flight jobs to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn process_job(
    runtime: &JobRuntime,
    config: &PoolConfig,
    events: &broadcast::Sender<PoolEvent>,
    retry_tx: &mpsc::Sender<IndexJob>,
    job: IndexJob,
) {
    let path = job.source_path.clone();
    let _ = events.send(PoolEvent::JobStarted { path: path.clone() });

    let outcome = tokio::time::timeout(config.job_timeout, run_index_job(runtime, &job)).await;
    let result = match outcome {
        Ok(result) => result,
        Err(_) => Err(LodestoneError::Timeout(format!(
            "indexing {} exceeded {:?}",
            path.display(),
            config.job_timeout
        ))),
    };

    match result {
        Ok(document_id) => {
            if let Err(err) = mark_registry(runtime, &job, RegistryStatus::Indexed, 0, None) {
                tracing::error!(error = %err, "failed to update registry after success");
            }
            let _ = events.send(PoolEvent::JobCompleted { path, document_id });
        }
        Err(err) => {
            let attempt = job.attempt + 1;
            let will_retry = attempt < config.max_retries;
            tracing::warn!(
                path = %path.display(),
                attempt,
                error = %err,
                will_retry,
                "indexing job failed"
            );
            if let Err(reg_err) = mark_registry(
                runtime,
                &job,
                RegistryStatus::Failed,
                attempt,
                Some(err.to_string()),
            ) {
                tracing::error!(error = %reg_err, "failed to update registry after failure");
            }
            let _ = events.send(PoolEvent::JobFailed {
                path: path.clone(),
                error: err.to_string(),
                will_retry,
            });

            if will_retry {
                let retry_tx = retry_tx.clone();
                let mut retry_job = job;
                retry_job.attempt = attempt;
                let delay = Duration::from_secs(2u64.pow(attempt.clamp(0, 6) as u32));
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = retry_tx.send(retry_job).await;
                });
            }
        }
    }
}

/// Read or convert the file, then run the shared indexing path
async fn run_index_job(runtime: &JobRuntime, job: &IndexJob) -> Result<String> {
    let path = &job.source_path;
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    let (markdown, source_name) = match runtime.caches.markdown.get(&job.file_hash) {
        Some(markdown) => (markdown, file_stem(path)),
        None => {
            let (markdown, source_name) = if is_pdf {
                runtime.converter.convert(path)?
            } else {
                (tokio::fs::read_to_string(path).await?, file_stem(path))
            };
            runtime
                .caches
                .markdown
                .insert(job.file_hash.clone(), markdown.clone());
            (markdown, source_name)
        }
    };

    let request = IndexRequest {
        workspace_id: job.workspace_id.clone(),
        session_id: job.session_id.clone(),
        artifact_entry_id: None,
        source_type: if is_pdf { SourceType::Pdf } else { SourceType::Artifact },
        source_name,
        source_path: Some(path.to_string_lossy().to_string()),
        file_size: Some(job.file_size as i64),
        markdown,
    };

    let outcome = index::index_document(
        &runtime.db_path,
        request,
        &runtime.settings,
        runtime.embedder.as_deref(),
        Some(&runtime.caches),
        runtime.clock.as_ref(),
    )
    .await?;
    Ok(outcome.document_id)
}

fn file_stem(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn mark_registry(
    runtime: &JobRuntime,
    job: &IndexJob,
    status: RegistryStatus,
    retry_count: i64,
    error_message: Option<String>,
) -> Result<()> {
    let db = Database::open(&runtime.db_path)?;
    let now = runtime.clock.now();
    db.upsert_registry_entry(&RegistryEntry {
        source_path: job.source_path.to_string_lossy().to_string(),
        content_hash: job.file_hash.clone(),
        status,
        retry_count,
        last_seen_at: Some(now),
        last_indexed_at: (status == RegistryStatus::Indexed).then_some(now),
        error_message,
        embedding_model: runtime
            .embedder
            .as_ref()
            .filter(|e| e.is_available())
            .map(|e| e.model().to_string()),
    })
}
