//! Stale session document cleanup
//!
//! Session-scoped documents are tombstoned with `stale_at` when their
//! session closes; once the tombstone outlives the retention window
//! the document and every derived row go away. Global documents are
//! never touched. Runs on a timer and on demand.

use crate::clock::Clock;
use crate::db::Database;
use crate::error::Result;
use chrono::Duration as ChronoDuration;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Emitted after each cleanup pass
#[derive(Debug, Clone)]
pub struct CleanupEvent {
    pub removed: usize,
}

/// Delete stale session documents older than the retention window.
///
/// Files are unlinked only when they live under `session_storage_dir`;
/// anything else on disk is left alone. Returns the number of
/// documents removed.
pub fn cleanup_stale(
    db_path: &Path,
    retention_days: i64,
    session_storage_dir: &Path,
    clock: &dyn Clock,
) -> Result<usize> {
    let cutoff = clock.now() - ChronoDuration::days(retention_days.max(0));
    let db = Database::open(db_path)?;
    let stale = db.list_stale_documents(cutoff)?;

    let mut removed = 0;
    for doc in stale {
        if let Some(source_path) = &doc.source_path {
            let path = Path::new(source_path);
            if path.starts_with(session_storage_dir) {
                if let Err(err) = std::fs::remove_file(path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %path.display(),
                            error = %err,
                            "failed to delete session file"
                        );
                    }
                }
            }
        }

        db.delete_document(&doc.id)?;
        if let Some(source_path) = &doc.source_path {
            db.delete_registry_entry(source_path)?;
        }
        removed += 1;
    }

    if removed > 0 {
        tracing::info!(removed, retention_days, "cleanup removed stale documents");
    }
    Ok(removed)
}

/// Periodic cleanup task
pub struct CleanupService {
    handle: JoinHandle<()>,
    stop: tokio::sync::watch::Sender<bool>,
    events: broadcast::Sender<CleanupEvent>,
}

impl CleanupService {
    pub fn start(
        db_path: PathBuf,
        session_storage_dir: PathBuf,
        retention_days: i64,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (stop, mut stopped) = tokio::sync::watch::channel(false);
        let (events, _) = broadcast::channel(16);
        let events_tx = events.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // immediate first tick is not a cleanup

            loop {
                tokio::select! {
                    changed = stopped.changed() => {
                        // A dropped sender also ends the task
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match cleanup_stale(&db_path, retention_days, &session_storage_dir, clock.as_ref()) {
                            Ok(removed) => {
                                let _ = events_tx.send(CleanupEvent { removed });
                            }
                            Err(err) => {
                                tracing::error!(error = %err, "scheduled cleanup failed");
                            }
                        }
                    }
                }
            }
        });

        Self {
            handle,
            stop,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CleanupEvent> {
        self.events.subscribe()
    }

    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RetrievalSettings;
    use crate::index::{prepare_document, IndexRequest, SourceType};
    use tempfile::TempDir;

    fn seed_session_doc(
        db: &Database,
        clock: &dyn Clock,
        session_id: &str,
        source_path: Option<String>,
        markdown: &str,
    ) -> String {
        let prepared = prepare_document(
            db,
            &IndexRequest {
                workspace_id: "ws-main".to_string(),
                session_id: Some(session_id.to_string()),
                artifact_entry_id: None,
                source_type: SourceType::Pdf,
                source_name: "upload".to_string(),
                source_path,
                file_size: None,
                markdown: markdown.to_string(),
            },
            &RetrievalSettings::default(),
            clock,
            false,
        )
        .unwrap();

        let embeddings: Vec<crate::db::vectors::EmbeddingInput> = prepared
            .chunks
            .iter()
            .map(|chunk| crate::db::vectors::EmbeddingInput {
                chunk_id: chunk.id.clone(),
                model: "stub".to_string(),
                vector: vec![1.0, 0.0],
            })
            .collect();
        db.upsert_embeddings(&embeddings, clock.now()).unwrap();

        prepared.document_id
    }

    #[test]
    fn test_cleanup_removes_old_stale_documents() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let storage = dir.path().join("sessions");
        std::fs::create_dir_all(&storage).unwrap();

        let saved = storage.join("upload.pdf");
        std::fs::write(&saved, b"pdf bytes").unwrap();

        let clock = ManualClock::new("2024-05-01T00:00:00Z".parse().unwrap());
        let db = Database::open(&db_path).unwrap();
        db.initialize().unwrap();

        let doc_id = seed_session_doc(
            &db,
            &clock,
            "sess-1",
            Some(saved.to_string_lossy().to_string()),
            "# Upload\nsession content here",
        );

        // Mark stale, then age past the 7-day retention
        db.mark_session_documents_stale("sess-1", clock.now()).unwrap();
        clock.advance(Duration::from_secs(8 * 24 * 3600));
        drop(db);

        let removed = cleanup_stale(&db_path, 7, &storage, &clock).unwrap();
        assert_eq!(removed, 1);
        assert!(!saved.exists());

        let db = Database::open(&db_path).unwrap();
        assert!(db.get_document(&doc_id).unwrap().is_none());
        assert_eq!(db.count_document_chunks(&doc_id).unwrap(), 0);
        assert!(db.verify_lexical_consistency().unwrap());
        assert_eq!(db.stats().unwrap().embedding_count, 0, "embeddings cascade away");
    }

    #[test]
    fn test_cleanup_spares_fresh_and_unstale() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let storage = dir.path().join("sessions");
        std::fs::create_dir_all(&storage).unwrap();

        let clock = ManualClock::new("2024-05-01T00:00:00Z".parse().unwrap());
        let db = Database::open(&db_path).unwrap();
        db.initialize().unwrap();

        // Stale but only one day old
        let fresh_id = seed_session_doc(&db, &clock, "sess-1", None, "# Fresh\nstill young");
        db.mark_session_documents_stale("sess-1", clock.now()).unwrap();

        // Never marked stale
        let keep_id = seed_session_doc(&db, &clock, "sess-2", None, "# Keep\nnever stale");

        clock.advance(Duration::from_secs(24 * 3600));
        drop(db);

        let removed = cleanup_stale(&db_path, 7, &storage, &clock).unwrap();
        assert_eq!(removed, 0);

        let db = Database::open(&db_path).unwrap();
        assert!(db.get_document(&fresh_id).unwrap().is_some());
        assert!(db.get_document(&keep_id).unwrap().is_some());
    }

    #[test]
    fn test_cleanup_never_touches_files_outside_storage() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let storage = dir.path().join("sessions");
        std::fs::create_dir_all(&storage).unwrap();

        let outside = dir.path().join("precious.pdf");
        std::fs::write(&outside, b"keep me").unwrap();

        let clock = ManualClock::new("2024-05-01T00:00:00Z".parse().unwrap());
        let db = Database::open(&db_path).unwrap();
        db.initialize().unwrap();

        seed_session_doc(
            &db,
            &clock,
            "sess-1",
            Some(outside.to_string_lossy().to_string()),
            "# Outside\nfile lives elsewhere",
        );
        db.mark_session_documents_stale("sess-1", clock.now()).unwrap();
        clock.advance(Duration::from_secs(10 * 24 * 3600));
        drop(db);

        let removed = cleanup_stale(&db_path, 7, &storage, &clock).unwrap();
        assert_eq!(removed, 1);
        assert!(outside.exists(), "files outside session storage survive");
    }
}
