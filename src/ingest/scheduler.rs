// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::ingest::config::EntitySource;
use crate::registry::SharedRegistry;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval_secs: u64,
}

/// Spawn the periodic driver. The first tick fires immediately; each tick
/// runs in its own task, so a slow tick does not delay the next one. Two
/// ticks touching the same feed are kept apart by the cache's own
/// in-flight guard.
pub fn spawn_scheduler(
    cfg: SchedulerCfg,
    registry: SharedRegistry,
    source: Arc<dyn EntitySource>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs.max(1)));
        loop {
            ticker.tick().await;

            let registry = registry.clone();
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                let report = crate::ingest::run_tick(&registry, source.as_ref()).await;
                tracing::info!(
                    target: "scheduler",
                    entities = report.entities,
                    fetched = report.fetched,
                    satisfied = report.satisfied,
                    skipped = report.skipped,
                    failed = report.failed,
                    "tick"
                );
            });
        }
    })
}
