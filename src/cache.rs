// src/cache.rs
//! # Windowed Cache
//! One instance per (entity, feed). Owns the cached events (descending by
//! timestamp), the covered interval and the adapter, and decides on every
//! `update` whether to skip, extend (merge) or replace the cached window.
//!
//! Readers never wait for a fetch: the event list and the covered interval
//! are swapped together only after a fetch fully succeeded.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CacheError, SnapshotError};
use crate::ingest::config::EntityConfig;
use crate::ingest::types::{Event, FeedAdapter};
use crate::period::Period;
use crate::snapshot::{Snapshot, SnapshotStore};

/// Slack used when comparing the desired window with the covered one.
pub const COVERAGE_TOLERANCE_SECS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Another update of this cache is in flight; nothing was done.
    Skipped,
    /// The covered interval already spans the desired window.
    AlreadySatisfied,
    Fetched {
        replaced: bool,
        fetched: usize,
        total: usize,
        persisted: bool,
    },
}

/// Result of [`WindowedCache::get_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSlice {
    pub events: Vec<Event>,
    /// A fetch was running, so `events` may be stale.
    pub fetch_in_progress: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    events: Arc<Vec<Event>>,
    covered: Period,
    /// Set when the adapter was reinitialised; cleared by the first
    /// successful fetch afterwards.
    replace_pending: bool,
}

pub struct WindowedCache {
    entity: String,
    feed: String,
    adapter: Mutex<Box<dyn FeedAdapter>>,
    state: RwLock<CacheState>,
    fetching: AtomicBool,
    store: SnapshotStore,
}

/// Clears the in-flight flag on every exit path of `update`.
struct FetchGuard<'a>(&'a AtomicBool);

impl<'a> FetchGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FetchGuard(flag))
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl WindowedCache {
    /// Build the cache, restoring its snapshot when one exists. A corrupt
    /// snapshot fails this cache only.
    pub fn open(
        entity: impl Into<String>,
        feed: impl Into<String>,
        mut adapter: Box<dyn FeedAdapter>,
        store: SnapshotStore,
    ) -> Result<Self, SnapshotError> {
        let entity = entity.into();
        let feed = feed.into();

        let mut state = CacheState::default();
        if let Some(snap) = store.load(&entity, &feed)? {
            let mut events = snap.data;
            sort_descending(&mut events);
            debug!(target: "cache", %entity, %feed, events = events.len(), "snapshot restored");
            adapter.restore_state(snap.meta);
            state.events = Arc::new(events);
            state.covered = snap.period;
        }

        Ok(Self {
            entity,
            feed,
            adapter: Mutex::new(adapter),
            state: RwLock::new(state),
            fetching: AtomicBool::new(false),
            store,
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.read_state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn update(&self, cfg: &EntityConfig) -> Result<UpdateOutcome, CacheError> {
        self.update_at(cfg, Utc::now()).await
    }

    /// Bring the cache up to date for `cfg`, with `now` closing open-ended
    /// entities.
    pub async fn update_at(
        &self,
        cfg: &EntityConfig,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, CacheError> {
        let Some(_guard) = FetchGuard::acquire(&self.fetching) else {
            debug!(target: "cache", entity = %self.entity, feed = %self.feed, "update already in flight, skipped");
            counter!("feed_update_skipped_total", "feed" => self.feed.clone()).increment(1);
            return Ok(UpdateOutcome::Skipped);
        };

        let mut adapter = self.adapter.lock().await;

        if adapter.needs_full_refetch(cfg) {
            info!(target: "cache", entity = %self.entity, feed = %self.feed, "selection changed, full refetch");
            adapter.reinitialize(cfg);
            self.write_state().replace_pending = true;
        }

        let (replace, covered) = {
            let st = self.read_state();
            if st.replace_pending {
                (true, Period::empty())
            } else {
                (false, st.covered)
            }
        };

        // an end still in the future is not final yet
        let desired_to = cfg.end.map_or(now, |end| end.min(now)).max(cfg.start);
        let desired = Period::new(cfg.start, desired_to);
        let tol = Duration::seconds(COVERAGE_TOLERANCE_SECS);
        if !replace && covered.covers(cfg.start, desired_to, tol) {
            return Ok(UpdateOutcome::AlreadySatisfied);
        }

        let (fetch_from, fetch_to) = covered
            .hull(&desired)
            .bounds()
            .unwrap_or((cfg.start, desired_to));

        debug!(
            target: "cache",
            entity = %self.entity,
            feed = %self.feed,
            from = %fetch_from,
            to = %fetch_to,
            replace,
            "fetching"
        );
        counter!("feed_fetch_total", "feed" => self.feed.clone()).increment(1);

        let fetched = adapter
            .fetch_interval(fetch_from, fetch_to)
            .await
            .map_err(|source| {
                counter!("feed_fetch_errors_total", "feed" => self.feed.clone()).increment(1);
                CacheError::FetchFailed {
                    entity: self.entity.clone(),
                    feed: self.feed.clone(),
                    source,
                }
            })?;
        let meta = adapter.describe_state();
        drop(adapter);

        let fetched_len = fetched.len();
        let (events, period) = {
            let current = self.read_state();
            let mut events = if replace {
                fetched
            } else {
                let mut all = Vec::with_capacity(current.events.len() + fetched_len);
                all.extend(current.events.iter().cloned());
                all.extend(fetched);
                all
            };
            sort_descending(&mut events);
            let period = if replace {
                desired
            } else {
                current.covered.hull(&desired)
            };
            (Arc::new(events), period)
        };

        {
            let mut st = self.write_state();
            st.events = Arc::clone(&events);
            st.covered = period;
            st.replace_pending = false;
        }

        let snapshot = Snapshot {
            period,
            data: events.as_ref().clone(),
            meta,
        };
        let persisted = match self.store.save(&self.entity, &self.feed, &snapshot).await {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "cache", entity = %self.entity, feed = %self.feed, error = %e, "snapshot write failed");
                counter!("snapshot_write_errors_total").increment(1);
                false
            }
        };

        Ok(UpdateOutcome::Fetched {
            replaced: replace,
            fetched: fetched_len,
            total: events.len(),
            persisted,
        })
    }

    /// Cached events with `from <= timestamp <= to`, newest first. Never
    /// waits for an in-flight fetch.
    pub fn get_data(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> CacheSlice {
        let fetch_in_progress = self.is_fetching();
        let events = Arc::clone(&self.read_state().events);

        let (from, to) = (from.timestamp(), to.timestamp());
        let start = events.partition_point(|e| e.timestamp > to);
        let end = events.partition_point(|e| e.timestamp >= from);

        CacheSlice {
            events: if start < end {
                events[start..end].to_vec()
            } else {
                Vec::new()
            },
            fetch_in_progress,
        }
    }

    pub fn current_coverage(&self) -> Period {
        self.read_state().covered
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for WindowedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedCache")
            .field("entity", &self.entity)
            .field("feed", &self.feed)
            .field("events", &self.len())
            .field("covered", &self.current_coverage())
            .field("fetching", &self.is_fetching())
            .finish()
    }
}

/// Stable, so equal timestamps keep their relative order.
fn sort_descending(events: &mut [Event]) {
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
