// tests/common/mod.rs
// Shared mock feed for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use firewatch_timeline::error::FeedError;
use firewatch_timeline::ingest::config::{Bounds, EntityConfig};
use firewatch_timeline::{Event, EventPayload, FeedAdapter, FeedMeta};

pub const BASE: i64 = 1_600_000_000;

/// Hour `n` after a fixed base instant.
pub fn t(n: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(BASE + n * 3600, 0).single().unwrap()
}

pub fn ts(n: i64) -> i64 {
    t(n).timestamp()
}

pub fn hotspot(ts: i64) -> Event {
    Event::new(
        ts,
        EventPayload::Hotspot {
            lat: 38.7,
            lon: -120.3,
            frp: None,
            confidence: None,
        },
    )
}

pub fn stamps(events: &[Event]) -> Vec<i64> {
    events.iter().map(|e| e.timestamp).collect()
}

pub fn bounds(shift: f64) -> Bounds {
    Bounds {
        min_lat: 38.5 + shift,
        min_lon: -120.6,
        max_lat: 38.9 + shift,
        max_lon: -120.0,
    }
}

pub fn entity(id: &str, start: i64, end: Option<i64>, feeds: &[&str]) -> EntityConfig {
    EntityConfig {
        id: id.into(),
        start: t(start),
        end: end.map(t),
        bounds: Some(bounds(0.0)),
        station: None,
        feeds: feeds.iter().map(|s| s.to_string()).collect(),
    }
}

/// Observation/control handle shared between a test and its mock feeds.
#[derive(Clone, Default)]
pub struct Probe {
    pub calls: Arc<AtomicUsize>,
    pub ranges: Arc<Mutex<Vec<(i64, i64)>>>,
    pub fail: Arc<AtomicBool>,
    pub gate: Arc<Mutex<Option<Arc<Notify>>>>,
    /// Events handed out by the next fetches (filtered to the range).
    pub upstream: Arc<Mutex<Vec<Event>>>,
    pub restored: Arc<Mutex<Option<FeedMeta>>>,
}

impl Probe {
    pub fn with_upstream(events: Vec<Event>) -> Self {
        let p = Self::default();
        p.set_upstream(events);
        p
    }

    pub fn set_upstream(&self, events: Vec<Event>) {
        *self.upstream.lock().unwrap() = events;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_range(&self) -> Option<(i64, i64)> {
        self.ranges.lock().unwrap().last().copied()
    }

    /// Make the next fetches wait until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let n = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(n.clone());
        n
    }

    /// Let a held fetch finish; later fetches run freely.
    pub fn release(&self) {
        if let Some(n) = self.gate.lock().unwrap().take() {
            n.notify_one();
        }
    }

    pub fn feed(&self) -> Box<dyn FeedAdapter> {
        Box::new(MockFeed {
            probe: self.clone(),
            bounds: None,
        })
    }
}

/// Bounds-selected feed that records every call.
pub struct MockFeed {
    probe: Probe,
    bounds: Option<Bounds>,
}

#[async_trait]
impl FeedAdapter for MockFeed {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_interval(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, FeedError> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        self.probe
            .ranges
            .lock()
            .unwrap()
            .push((from.timestamp(), to.timestamp()));

        let gate = self.probe.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.probe.fail.load(Ordering::SeqCst) {
            return Err(FeedError::Network("upstream down".into()));
        }
        Ok(self
            .probe
            .upstream
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp >= from.timestamp() && e.timestamp <= to.timestamp())
            .cloned()
            .collect())
    }

    fn needs_full_refetch(&self, cfg: &EntityConfig) -> bool {
        match (&self.bounds, &cfg.bounds) {
            (Some(a), Some(b)) => !a.approx_eq(b, 1e-6),
            (None, None) => false,
            _ => true,
        }
    }

    fn reinitialize(&mut self, cfg: &EntityConfig) {
        self.bounds = cfg.bounds;
    }

    fn describe_state(&self) -> FeedMeta {
        FeedMeta::Hotspots {
            bounds: self.bounds,
        }
    }

    fn restore_state(&mut self, meta: FeedMeta) {
        if let FeedMeta::Hotspots { bounds } = &meta {
            self.bounds = *bounds;
        }
        *self.probe.restored.lock().unwrap() = Some(meta);
    }
}
