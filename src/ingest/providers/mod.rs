// src/ingest/providers/mod.rs
//! Concrete feeds and the name → constructor map the registry builds
//! caches from.

pub mod flights;
pub mod hotspots;
pub mod weather;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FeedError;
use crate::ingest::config::{AppConfig, Bounds};
use crate::ingest::types::{Event, FeedAdapter};
use crate::period::parse_instant;

pub use flights::FlightsProvider;
pub use hotspots::HotspotsProvider;
pub use weather::WeatherProvider;

pub const HOTSPOTS: &str = "hotspots";
pub const WEATHER: &str = "weather";
pub const FLIGHTS: &str = "flights";

/// Degrees a bound may drift before cached data is considered invalid.
pub const BOUNDS_TOLERANCE: f64 = 1e-6;

const HTTP_TIMEOUT_SECS: u64 = 60;

pub type FeedCtor = Arc<dyn Fn() -> Box<dyn FeedAdapter> + Send + Sync>;

/// Feed name → adapter constructor, built once at startup.
#[derive(Clone, Default)]
pub struct FeedFactory {
    ctors: HashMap<String, FeedCtor>,
}

impl FeedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, name: impl Into<String>, ctor: F) -> Self
    where
        F: Fn() -> Box<dyn FeedAdapter> + Send + Sync + 'static,
    {
        self.ctors.insert(name.into(), Arc::new(ctor));
        self
    }

    /// Register every feed whose upstream URL is configured. All feeds
    /// share one HTTP client.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let mut factory = Self::new();
        if let Some(url) = cfg.hotspots_url.clone() {
            let client = client.clone();
            factory = factory.with(HOTSPOTS, move || {
                Box::new(HotspotsProvider::from_url(url.clone(), client.clone()))
            });
        }
        if let Some(url) = cfg.weather_url.clone() {
            let client = client.clone();
            factory = factory.with(WEATHER, move || {
                Box::new(WeatherProvider::from_url(url.clone(), client.clone()))
            });
        }
        if let Some(url) = cfg.flights_url.clone() {
            factory = factory.with(FLIGHTS, move || {
                Box::new(FlightsProvider::from_url(url.clone(), client.clone()))
            });
        }
        factory
    }

    pub fn build(&self, feed: &str) -> Option<Box<dyn FeedAdapter>> {
        self.ctors.get(feed).map(|ctor| ctor())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ctors.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Where a provider reads its records from.
#[derive(Debug, Clone)]
pub(crate) enum Mode {
    /// JSON array held in memory.
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl Mode {
    /// Raw JSON records from the upstream. Accepts a bare array or an
    /// object wrapping it under `data`.
    pub(crate) async fn records(
        &self,
        query: &[(&str, String)],
    ) -> Result<Vec<serde_json::Value>, FeedError> {
        let body = match self {
            Mode::Fixture(s) => serde_json::from_str::<serde_json::Value>(s)?,
            Mode::Http { url, client } => {
                let resp = client.get(url).query(query).send().await?;
                let status = resp.status();
                let text = resp.text().await?;
                if !status.is_success() {
                    return Err(FeedError::Status {
                        status: status.as_u16(),
                        message: text.chars().take(200).collect(),
                    });
                }
                serde_json::from_str::<serde_json::Value>(&text)?
            }
        };

        match body {
            serde_json::Value::Array(items) => Ok(items),
            serde_json::Value::Object(mut obj) => match obj.remove("data") {
                Some(serde_json::Value::Array(items)) => Ok(items),
                _ => Err(FeedError::Body("expected a JSON array".into())),
            },
            _ => Err(FeedError::Body("expected a JSON array".into())),
        }
    }
}

/// Record timestamp as sent upstream: unix seconds or an ISO string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawTime {
    Unix(i64),
    Text(String),
}

impl RawTime {
    pub(crate) fn unix(&self) -> Option<i64> {
        match self {
            RawTime::Unix(s) => Some(*s),
            RawTime::Text(s) => parse_instant(s).map(|dt| dt.timestamp()),
        }
    }
}

/// Decode each record on its own; a record that does not decode (or that
/// `convert` rejects) is dropped and counted, the rest survive.
pub(crate) fn parse_records<T, F>(
    feed: &'static str,
    records: Vec<serde_json::Value>,
    mut convert: F,
) -> Vec<Event>
where
    T: DeserializeOwned,
    F: FnMut(T) -> Option<Event>,
{
    let mut out = Vec::with_capacity(records.len());
    let mut dropped = 0u64;
    for rec in records {
        match serde_json::from_value::<T>(rec).ok().and_then(&mut convert) {
            Some(ev) => out.push(ev),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::debug!(target: "ingest", feed, dropped, "records dropped (unparseable or outside selection)");
        counter!("feed_records_dropped_total", "feed" => feed).increment(dropped);
    }
    out
}

pub(crate) fn in_range(ts: i64, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    ts >= from.timestamp() && ts <= to.timestamp()
}

pub(crate) fn bounds_changed(current: Option<&Bounds>, wanted: Option<&Bounds>) -> bool {
    match (current, wanted) {
        (Some(a), Some(b)) => !a.approx_eq(b, BOUNDS_TOLERANCE),
        (None, None) => false,
        _ => true,
    }
}

pub(crate) fn bbox_param(b: &Bounds) -> String {
    format!("{},{},{},{}", b.min_lon, b.min_lat, b.max_lon, b.max_lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Rec {
        time: RawTime,
    }

    #[test]
    fn bad_records_are_dropped_individually() {
        let records: Vec<serde_json::Value> = serde_json::from_str(
            r#"[{"time": 10}, {"time": "not a time"}, {"nope": 1}, {"time": "1970-01-01T00:00:20Z"}]"#,
        )
        .unwrap();
        let out = parse_records(HOTSPOTS, records, |r: Rec| {
            r.time.unix().map(|ts| {
                Event::new(
                    ts,
                    crate::ingest::types::EventPayload::Hotspot {
                        lat: 0.0,
                        lon: 0.0,
                        frp: None,
                        confidence: None,
                    },
                )
            })
        });
        let ts: Vec<i64> = out.iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![10, 20]);
    }

    #[tokio::test]
    async fn fixture_accepts_wrapped_array() {
        let m = Mode::Fixture(r#"{"data": [{"a": 1}]}"#.into());
        assert_eq!(m.records(&[]).await.unwrap().len(), 1);
        let m = Mode::Fixture(r#"{"rows": []}"#.into());
        assert!(matches!(m.records(&[]).await, Err(FeedError::Body(_))));
    }

    #[test]
    fn bounds_change_detection() {
        let a = Bounds {
            min_lat: 1.0,
            min_lon: 1.0,
            max_lat: 2.0,
            max_lon: 2.0,
        };
        let mut b = a;
        assert!(!bounds_changed(Some(&a), Some(&b)));
        b.min_lat = 1.5;
        assert!(bounds_changed(Some(&a), Some(&b)));
        assert!(bounds_changed(None, Some(&a)));
        assert!(!bounds_changed(None, None));
    }

    #[test]
    fn factory_only_registers_configured_feeds() {
        let cfg = AppConfig {
            entity_dir: "config/entities".into(),
            snapshot_dir: "state/snapshots".into(),
            refresh_interval_secs: 300,
            hotspots_url: Some("http://hotspots.test".into()),
            weather_url: None,
            flights_url: Some("http://flights.test".into()),
        };
        let f = FeedFactory::from_config(&cfg);
        assert_eq!(f.names(), vec![FLIGHTS.to_string(), HOTSPOTS.to_string()]);
        assert_eq!(f.build(HOTSPOTS).unwrap().name(), HOTSPOTS);
        assert!(f.build(WEATHER).is_none());
    }
}
