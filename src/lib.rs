// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod metrics;
pub mod period;
pub mod query;
pub mod registry;
pub mod snapshot;

use axum::Router;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ingest::config::{AppConfig, DirEntitySource};
use crate::ingest::providers::FeedFactory;
use crate::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use crate::registry::Registry;
use crate::snapshot::SnapshotStore;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::cache::{UpdateOutcome, WindowedCache};
pub use crate::ingest::types::{Event, EventPayload, FeedAdapter, FeedMeta};
pub use crate::registry::SharedRegistry;

/// Wire the registry, the periodic scheduler and the HTTP router from
/// `cfg`. Must be called inside a Tokio runtime.
pub fn app(cfg: &AppConfig) -> Router {
    let factory = FeedFactory::from_config(cfg);
    if factory.names().is_empty() {
        warn!("no feed upstream configured; entities will have no data");
    }
    info!(
        feeds = ?factory.names(),
        entity_dir = %cfg.entity_dir.display(),
        snapshot_dir = %cfg.snapshot_dir.display(),
        interval_secs = cfg.refresh_interval_secs,
        "starting"
    );

    let registry = Registry::new(factory, SnapshotStore::new(&cfg.snapshot_dir)).shared();
    spawn_scheduler(
        SchedulerCfg {
            interval_secs: cfg.refresh_interval_secs,
        },
        registry.clone(),
        Arc::new(DirEntitySource::new(&cfg.entity_dir)),
    );

    let router = api::router(registry);
    match metrics::Metrics::init(cfg.refresh_interval_secs) {
        Ok(m) => router.merge(m.router()),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "metrics endpoint disabled");
            router
        }
    }
}
