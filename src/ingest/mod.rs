// src/ingest/mod.rs
pub mod config;
pub mod providers;
pub mod scheduler;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::sync::{Arc, PoisonError};
use tokio::task::JoinSet;

use crate::cache::UpdateOutcome;
use crate::ingest::config::EntitySource;
use crate::registry::{reconcile_shared, SharedRegistry};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_fetch_total", "Upstream fetches started, per feed.");
        describe_counter!("feed_fetch_errors_total", "Upstream fetches that failed, per feed.");
        describe_counter!(
            "feed_update_skipped_total",
            "Updates rejected because a fetch was already in flight."
        );
        describe_counter!(
            "feed_records_dropped_total",
            "Upstream records dropped as unparseable or outside the selection."
        );
        describe_counter!("snapshot_write_errors_total", "Snapshot writes that failed.");
        describe_counter!("scheduler_ticks_total", "Completed scheduler ticks.");
        describe_gauge!("scheduler_last_tick_ts", "Unix ts when the last tick finished.");
        describe_gauge!("scheduler_refresh_interval_secs", "Configured seconds between ticks.");
    });
}

/// Tally of one tick across all (entity, feed) pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub entities: usize,
    pub fetched: usize,
    pub satisfied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Reload entity configuration, reconcile the registry and update every
/// enabled feed concurrently. A failing feed never stops the others.
pub async fn run_tick(registry: &SharedRegistry, source: &dyn EntitySource) -> TickReport {
    ensure_metrics_described();

    match source.load().await {
        Ok(configs) => {
            let r = reconcile_shared(registry, configs).await;
            tracing::debug!(target: "scheduler", entities = r.entities, created = r.created, failed = r.failed, dormant = r.dormant, "registry reconciled");
        }
        Err(e) => {
            tracing::warn!(target: "scheduler", error = %format!("{e:#}"), "entity config reload failed, keeping previous set");
        }
    }

    let work = registry
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .active();

    let mut report = TickReport {
        entities: work.len(),
        ..Default::default()
    };

    let mut set = JoinSet::new();
    for entity in work {
        let cfg = Arc::new(entity.config);
        for (feed, cache) in entity.caches {
            let cfg = Arc::clone(&cfg);
            set.spawn(async move {
                let res = cache.update(&cfg).await;
                (cfg.id.clone(), feed, res)
            });
        }
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((entity, feed, Ok(outcome))) => match outcome {
                UpdateOutcome::Fetched {
                    replaced,
                    fetched,
                    total,
                    persisted,
                } => {
                    report.fetched += 1;
                    tracing::info!(target: "scheduler", %entity, %feed, replaced, fetched, total, persisted, "feed updated");
                }
                UpdateOutcome::AlreadySatisfied => report.satisfied += 1,
                UpdateOutcome::Skipped => report.skipped += 1,
            },
            Ok((entity, feed, Err(e))) => {
                report.failed += 1;
                tracing::warn!(target: "scheduler", %entity, %feed, error = %e, "feed update failed, retrying next tick");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(target: "scheduler", error = %e, "feed update task aborted");
            }
        }
    }

    counter!("scheduler_ticks_total").increment(1);
    gauge!("scheduler_last_tick_ts").set(chrono::Utc::now().timestamp() as f64);

    report
}
