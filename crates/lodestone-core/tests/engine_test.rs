//! Engine facade: the exposed operations wired together.

mod common;

use common::request;
use lodestone_core::index::pool::PoolEvent;
use lodestone_core::{
    Capabilities, Engine, EngineConfig, LodestoneError, MarkdownConverter, RegistryStatus,
    RetrievalSettings, Scope, GLOBAL_WORKSPACE,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct NoopConverter;

impl MarkdownConverter for NoopConverter {
    fn convert(&self, _path: &Path) -> lodestone_core::Result<(String, String)> {
        Ok(("# stub".to_string(), "stub".to_string()))
    }
}

fn engine_config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        db_path: dir.path().join("index.sqlite"),
        session_storage_dir: dir.path().join("sessions"),
        watch_dir: None,
        settings: RetrievalSettings::default(),
        watcher: Default::default(),
        pool: Default::default(),
    }
}

fn start_engine(dir: &TempDir) -> Engine {
    Engine::start(
        engine_config(dir),
        Capabilities::minimal(Arc::new(NoopConverter)),
    )
    .unwrap()
}

#[tokio::test]
async fn index_then_retrieve_through_the_facade() {
    let dir = TempDir::new().unwrap();
    let engine = start_engine(&dir);

    let outcome = engine
        .index_document(request(
            GLOBAL_WORKSPACE,
            None,
            "handbook",
            "# Onboarding\nthe retrieval engine indexes markdown",
        ))
        .await
        .unwrap();
    assert!(!outcome.skipped);

    let result = engine
        .retrieve("how does the engine index markdown", Scope::Global)
        .await
        .unwrap();
    assert!(result.grounded);
    assert_eq!(result.used_scope, "global");
    assert!(result.context_text.contains("handbook | Onboarding"));

    engine.shutdown().await;
}

#[tokio::test]
async fn enqueue_file_validates_paths() {
    let dir = TempDir::new().unwrap();
    let engine = start_engine(&dir);

    let err = engine.enqueue_file(Path::new("relative.md")).unwrap_err();
    assert!(matches!(err, LodestoneError::PathInvalid(_)));

    let err = engine
        .enqueue_file(&dir.path().join("missing.md"))
        .unwrap_err();
    assert!(matches!(err, LodestoneError::PathInvalid(_)));

    engine.shutdown().await;
}

#[tokio::test]
async fn enqueue_and_registry_lifecycle() {
    let dir = TempDir::new().unwrap();
    let engine = start_engine(&dir);

    let file = dir.path().join("note.md");
    std::fs::write(&file, "# Note\nqueued through the engine").unwrap();

    let mut events = engine.subscribe_index_events();
    let registry_key = engine.enqueue_file(&file).unwrap();
    assert_eq!(registry_key, file.to_string_lossy());

    loop {
        match events.recv().await.unwrap() {
            PoolEvent::JobCompleted { .. } => break,
            PoolEvent::JobFailed { error, .. } => panic!("job failed: {}", error),
            PoolEvent::JobStarted { .. } => continue,
        }
    }

    let indexed = engine.list_registry(Some(RegistryStatus::Indexed)).unwrap();
    assert_eq!(indexed.len(), 1);
    assert_eq!(indexed[0].source_path, registry_key);

    // The queued file is now retrievable
    let result = engine.retrieve("queued engine", Scope::Global).await.unwrap();
    assert!(result.grounded);

    engine.shutdown().await;
}

#[tokio::test]
async fn rescan_reports_enqueued_count() {
    let dir = TempDir::new().unwrap();
    let engine = start_engine(&dir);

    let docs = TempDir::new().unwrap();
    std::fs::write(docs.path().join("a.md"), "# A\nalpha").unwrap();
    std::fs::write(docs.path().join("b.md"), "# B\nbeta").unwrap();
    std::fs::write(docs.path().join("skip.txt"), "not matched").unwrap();

    let enqueued = engine.rescan(docs.path()).await.unwrap();
    assert_eq!(enqueued, 2);

    let err = engine.rescan(Path::new("/no/such/dir")).await.unwrap_err();
    assert!(matches!(err, LodestoneError::PathInvalid(_)));

    engine.shutdown().await;
}

#[tokio::test]
async fn session_close_then_cleanup_through_the_facade() {
    let dir = TempDir::new().unwrap();
    let engine = start_engine(&dir);

    engine
        .index_document(request(
            "ws-main",
            Some("sess-1"),
            "upload",
            "# Upload\nsession bound content",
        ))
        .await
        .unwrap();

    let marked = engine.mark_session_stale("sess-1").unwrap();
    assert_eq!(marked, 1);

    // Retention 0: anything stale is old enough
    let removed = engine.cleanup_stale(Some(0)).unwrap();
    assert_eq!(removed, 1);

    let result = engine
        .retrieve("session bound content", Scope::Session("sess-1".into()))
        .await
        .unwrap();
    assert!(!result.grounded);

    engine.shutdown().await;
}
