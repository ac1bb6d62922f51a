// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::ingest::config::{Bounds, EntityConfig};

/// One timestamped observation produced by a feed. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// unix seconds
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Hotspot {
        lat: f64,
        lon: f64,
        #[serde(default)]
        frp: Option<f64>,
        #[serde(default)]
        confidence: Option<String>,
    },
    Weather {
        station: String,
        #[serde(default)]
        temperature_c: Option<f64>,
        #[serde(default)]
        wind_speed_kph: Option<f64>,
        #[serde(default)]
        wind_dir_deg: Option<f64>,
        #[serde(default)]
        raw: Option<String>,
    },
    Flight {
        callsign: String,
        lat: f64,
        lon: f64,
        #[serde(default)]
        altitude_m: Option<f64>,
    },
}

impl Event {
    pub fn new(timestamp: i64, payload: EventPayload) -> Self {
        Self { timestamp, payload }
    }

    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::Hotspot { .. } => "hotspot",
            EventPayload::Weather { .. } => "weather",
            EventPayload::Flight { .. } => "flight",
        }
    }
}

/// Feed-specific selection parameters persisted next to the cached events.
/// Only the owning adapter interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "feed", rename_all = "snake_case")]
pub enum FeedMeta {
    #[default]
    Empty,
    Hotspots {
        bounds: Option<Bounds>,
    },
    Weather {
        station: Option<String>,
    },
    Flights {
        bounds: Option<Bounds>,
    },
}

/// Capability every upstream feed implements. The cache drives it; the
/// adapter never sees cached events.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// All known events within `[from, to]`. May be slow and may fail.
    async fn fetch_interval(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, FeedError>;

    /// True when `cfg` selects different upstream data than what the
    /// adapter was last initialised with.
    fn needs_full_refetch(&self, cfg: &EntityConfig) -> bool;

    /// Adopt the selection parameters of `cfg`. Only called after
    /// `needs_full_refetch` returned true.
    fn reinitialize(&mut self, cfg: &EntityConfig);

    fn describe_state(&self) -> FeedMeta;

    fn restore_state(&mut self, meta: FeedMeta);
}
