//! Directory watcher
//!
//! Polls one configured directory, diffing modification times. Changed
//! paths sit in a pending set until the stream has been quiet for the
//! debounce window, then get hashed, checked against the registry and
//! enqueued smallest-first. Producers block on the bounded queue, so a
//! bulk drop of files throttles itself.

use crate::clock::Clock;
use crate::db::{Database, RegistryEntry, RegistryStatus};
use crate::error::{LodestoneError, Result};
use crate::index::pool::{IndexJob, IndexPool};
use glob::Pattern;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use walkdir::{DirEntry, WalkDir};

/// Directories never scanned
const EXCLUDE_DIRS: &[&str] = &[".git", ".cache", "node_modules", "target", "__pycache__"];

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiescence window after the last observed change
    pub debounce: Duration,
    /// Directory poll period
    pub poll_interval: Duration,
    /// Glob patterns of files to index
    pub patterns: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2500),
            poll_interval: Duration::from_millis(1000),
            patterns: vec!["**/*.pdf".to_string(), "**/*.md".to_string()],
        }
    }
}

/// Scan a directory once for files matching the patterns
pub fn scan_files(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(LodestoneError::PathInvalid(format!(
            "not a directory: {}",
            root.display()
        )));
    }
    let compiled: Vec<Pattern> = patterns
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<std::result::Result<_, _>>()?;

    let mut results = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !should_skip(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| path.to_string_lossy().to_string());
        if compiled.iter().any(|p| p.matches(&relative)) {
            results.push(path.to_path_buf());
        }
    }
    results.sort();
    Ok(results)
}

fn should_skip(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') && name.len() > 1 {
        return true;
    }
    entry.file_type().is_dir() && EXCLUDE_DIRS.iter().any(|d| name == *d)
}

/// Hash candidates, consult the registry, and enqueue what is new or
/// changed. Smaller files go first. Returns the number enqueued.
pub async fn process_candidates(
    db_path: &Path,
    pool: &IndexPool,
    clock: &dyn Clock,
    paths: Vec<PathBuf>,
) -> Result<usize> {
    // Hash and size everything up front so enqueue order is by size
    let mut candidates: Vec<(PathBuf, String, u64)> = Vec::new();
    for path in paths {
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to stat candidate");
                continue;
            }
        };
        let hash = match crate::index::hash_file(&path) {
            Ok(hash) => hash,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to hash candidate");
                continue;
            }
        };
        candidates.push((path, hash, metadata.len()));
    }
    candidates.sort_by_key(|(_, _, size)| *size);

    let mut enqueued = 0;
    for (path, hash, size) in candidates {
        let path_str = path.to_string_lossy().to_string();
        let now = clock.now();

        let skip = {
            let db = Database::open(db_path)?;
            match db.get_registry_entry(&path_str)? {
                Some(entry)
                    if entry.content_hash == hash && entry.status == RegistryStatus::Indexed =>
                {
                    db.touch_registry_entry(&path_str, now)?;
                    true
                }
                existing => {
                    db.upsert_registry_entry(&RegistryEntry {
                        source_path: path_str.clone(),
                        content_hash: hash.clone(),
                        status: RegistryStatus::Pending,
                        retry_count: existing.map(|e| e.retry_count).unwrap_or(0),
                        last_seen_at: Some(now),
                        last_indexed_at: None,
                        error_message: None,
                        embedding_model: None,
                    })?;
                    false
                }
            }
        };
        if skip {
            continue;
        }

        pool.enqueue(IndexJob {
            source_path: path,
            file_hash: hash,
            file_size: size,
            attempt: 0,
            session_id: None,
            workspace_id: crate::db::GLOBAL_WORKSPACE.to_string(),
        })
        .await?;
        enqueued += 1;
    }
    Ok(enqueued)
}

/// Walk the directory once, applying the same dedup path as the
/// watcher. Returns the number of jobs enqueued.
pub async fn rescan(
    db_path: &Path,
    pool: &IndexPool,
    clock: &dyn Clock,
    dir: &Path,
    patterns: &[String],
) -> Result<usize> {
    let paths = scan_files(dir, patterns)?;
    process_candidates(db_path, pool, clock, paths).await
}

/// Handle over the background watch task
pub struct Watcher {
    handle: JoinHandle<()>,
    stop: tokio::sync::watch::Sender<bool>,
}

impl Watcher {
    /// Start watching `dir`. The initial scan enqueues existing files.
    pub fn start(
        dir: PathBuf,
        config: WatcherConfig,
        db_path: PathBuf,
        pool: Arc<IndexPool>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if !dir.is_dir() {
            return Err(LodestoneError::PathInvalid(format!(
                "watch directory not found: {}",
                dir.display()
            )));
        }
        let (stop, mut stopped) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut known_mtimes: HashMap<PathBuf, SystemTime> = HashMap::new();
            let mut pending: HashSet<PathBuf> = HashSet::new();
            let mut quiet_for = Duration::ZERO;
            let mut first_scan = true;

            loop {
                tokio::select! {
                    changed = stopped.changed() => {
                        // A dropped sender also ends the task
                        if changed.is_err() || *stopped.borrow() {
                            tracing::info!(dir = %dir.display(), "watcher stopped");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }

                let paths = match scan_files(&dir, &config.patterns) {
                    Ok(paths) => paths,
                    Err(err) => {
                        tracing::warn!(error = %err, "watch scan failed");
                        continue;
                    }
                };

                let mut current: HashMap<PathBuf, SystemTime> = HashMap::new();
                let mut changed = false;
                for path in paths {
                    let mtime = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                        Ok(mtime) => mtime,
                        Err(_) => continue,
                    };
                    if first_scan || known_mtimes.get(&path) != Some(&mtime) {
                        pending.insert(path.clone());
                        changed = true;
                    }
                    current.insert(path, mtime);
                }
                known_mtimes = current;
                first_scan = false;

                if changed {
                    quiet_for = Duration::ZERO;
                } else {
                    quiet_for += config.poll_interval;
                }

                // Quiescence reached: flush the pending set
                if !pending.is_empty() && quiet_for >= config.debounce {
                    let batch: Vec<PathBuf> = pending.drain().collect();
                    match process_candidates(&db_path, &pool, clock.as_ref(), batch).await {
                        Ok(enqueued) if enqueued > 0 => {
                            tracing::info!(enqueued, "watcher enqueued indexing jobs");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "watcher failed to enqueue batch");
                        }
                    }
                }
            }
        });

        Ok(Self { handle, stop })
    }

    /// Signal the watch task to stop and wait for it
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
