//! Watch, enqueue and rescan commands

use anyhow::Result;
use lodestone_core::index::pool::PoolEvent;
use lodestone_core::Engine;
use std::path::Path;

pub fn enqueue(engine: &Engine, path: &Path) -> Result<()> {
    let registry_key = engine.enqueue_file(path)?;
    println!("Queued {}", registry_key);
    Ok(())
}

pub async fn rescan(engine: &Engine, dir: &Path) -> Result<()> {
    let enqueued = engine.rescan(dir).await?;
    println!("Enqueued {} file(s) from {}", enqueued, dir.display());
    Ok(())
}

/// Watch the configured directory, reporting job events until ctrl-c
pub async fn run(engine: &Engine) -> Result<()> {
    engine.start_watcher().await?;
    engine.start_cleanup_timer().await;
    let mut events = engine.subscribe_index_events();
    println!("Watching; press ctrl-c to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping watcher.");
                return Ok(());
            }
            event = events.recv() => {
                match event {
                    Ok(PoolEvent::JobStarted { path }) => {
                        println!("indexing {}", path.display());
                    }
                    Ok(PoolEvent::JobCompleted { path, document_id }) => {
                        println!("indexed  {} -> {}", path.display(), document_id);
                    }
                    Ok(PoolEvent::JobFailed { path, error, will_retry }) => {
                        if will_retry {
                            println!("retrying {} ({})", path.display(), error);
                        } else {
                            println!("failed   {} ({})", path.display(), error);
                        }
                    }
                    Err(_) => return Ok(()),
                }
            }
        }
    }
}
