// src/registry.rs
//! Entity id → windowed caches, reconciled against the latest entity
//! configuration on every tick.
//!
//! Caches are created the first time an (entity, feed) pair shows up and
//! are never torn down: a feed dropped from the configuration simply stops
//! being updated and queried, and its snapshot stays on disk.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::cache::WindowedCache;
use crate::error::ConfigError;
use crate::ingest::config::EntityConfig;
use crate::ingest::providers::FeedFactory;
use crate::snapshot::SnapshotStore;

pub type SharedRegistry = Arc<RwLock<Registry>>;

type CacheKey = (String, String);
type Opened = (CacheKey, Result<WindowedCache, ConfigError>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub entities: usize,
    pub created: usize,
    pub failed: usize,
    pub dormant: usize,
}

/// One active entity and its caches, in declared feed order.
#[derive(Debug, Clone)]
pub struct ActiveEntity {
    pub config: EntityConfig,
    pub caches: Vec<(String, Arc<WindowedCache>)>,
}

pub struct Registry {
    factory: FeedFactory,
    store: SnapshotStore,
    entities: Vec<EntityConfig>,
    caches: HashMap<CacheKey, Arc<WindowedCache>>,
}

impl Registry {
    pub fn new(factory: FeedFactory, store: SnapshotStore) -> Self {
        Self {
            factory,
            store,
            entities: Vec::new(),
            caches: HashMap::new(),
        }
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// (entity, feed) pairs in `configs` that have no cache yet.
    fn missing(&self, configs: &[EntityConfig]) -> Vec<CacheKey> {
        configs
            .iter()
            .flat_map(|cfg| cfg.feeds.iter().map(|feed| (cfg.id.clone(), feed.clone())))
            .filter(|key| !self.caches.contains_key(key))
            .collect()
    }

    /// Adopt `configs` as the active entity set and add the freshly opened
    /// caches. Failures skip only the offending (entity, feed) pair.
    fn install(&mut self, configs: Vec<EntityConfig>, opened: Vec<Opened>) -> ReconcileReport {
        let mut report = ReconcileReport {
            entities: configs.len(),
            ..Default::default()
        };

        for (key, res) in opened {
            match res {
                Ok(cache) => {
                    // a concurrent tick may have opened the same pair first
                    if self.caches.contains_key(&key) {
                        continue;
                    }
                    tracing::info!(target: "registry", entity = %key.0, feed = %key.1, "cache created");
                    self.caches.insert(key, Arc::new(cache));
                    report.created += 1;
                }
                Err(e) => {
                    tracing::warn!(target: "registry", error = %e, "feed skipped");
                    report.failed += 1;
                }
            }
        }

        self.entities = configs;
        report.dormant = self
            .caches
            .keys()
            .filter(|(entity, feed)| {
                !self
                    .entity(entity)
                    .is_some_and(|cfg| cfg.has_feed(feed))
            })
            .count();
        report
    }

    pub fn entities(&self) -> &[EntityConfig] {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Cache of an (entity, feed) pair, dormant ones included.
    pub fn cache(&self, entity: &str, feed: &str) -> Option<Arc<WindowedCache>> {
        self.caches
            .get(&(entity.to_string(), feed.to_string()))
            .cloned()
    }

    /// Work list for a tick: every active entity with the caches of its
    /// currently enabled feeds.
    pub fn active(&self) -> Vec<ActiveEntity> {
        self.entities
            .iter()
            .map(|cfg| ActiveEntity {
                config: cfg.clone(),
                caches: cfg
                    .feeds
                    .iter()
                    .filter_map(|feed| self.cache(&cfg.id, feed).map(|c| (feed.clone(), c)))
                    .collect(),
            })
            .collect()
    }
}

/// Reconcile the registry against the latest entity set. New caches are
/// opened on the blocking pool, outside the lock; the write lock is only
/// taken to install them.
pub async fn reconcile_shared(
    registry: &SharedRegistry,
    configs: Vec<EntityConfig>,
) -> ReconcileReport {
    let (factory, store, missing) = {
        let guard = registry.read().unwrap_or_else(PoisonError::into_inner);
        (
            guard.factory.clone(),
            guard.store.clone(),
            guard.missing(&configs),
        )
    };

    let wanted = missing.len();
    let mut aborted = 0;
    let opened = if missing.is_empty() {
        Vec::new()
    } else {
        match tokio::task::spawn_blocking(move || open_caches(&factory, &store, missing)).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::error!(target: "registry", error = %e, "cache open task aborted");
                aborted = wanted;
                Vec::new()
            }
        }
    };

    let mut report = registry
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .install(configs, opened);
    report.failed += aborted;
    report
}

fn open_caches(factory: &FeedFactory, store: &SnapshotStore, keys: Vec<CacheKey>) -> Vec<Opened> {
    keys.into_iter()
        .map(|key| {
            let res = open_cache(factory, store, &key.0, &key.1);
            (key, res)
        })
        .collect()
}

fn open_cache(
    factory: &FeedFactory,
    store: &SnapshotStore,
    entity: &str,
    feed: &str,
) -> Result<WindowedCache, ConfigError> {
    let adapter = factory
        .build(feed)
        .ok_or_else(|| ConfigError::UnknownFeed {
            entity: entity.to_string(),
            feed: feed.to_string(),
        })?;
    WindowedCache::open(entity, feed, adapter, store.clone()).map_err(|source| {
        ConfigError::Snapshot {
            entity: entity.to_string(),
            feed: feed.to_string(),
            source,
        }
    })
}
