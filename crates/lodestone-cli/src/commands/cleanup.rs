//! Cleanup command

use anyhow::Result;
use lodestone_core::Engine;

pub fn run(engine: &Engine, retention_days: Option<i64>) -> Result<()> {
    let removed = engine.cleanup_stale(retention_days)?;
    println!("Removed {} stale session document(s)", removed);
    Ok(())
}
