// src/ingest/providers/hotspots.rs
//! Satellite hotspot detections inside the entity's bounding box.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{bbox_param, bounds_changed, in_range, parse_records, Mode, RawTime, HOTSPOTS};
use crate::error::FeedError;
use crate::ingest::config::{Bounds, EntityConfig};
use crate::ingest::types::{Event, EventPayload, FeedAdapter, FeedMeta};

#[derive(Debug, Deserialize)]
struct HotspotRecord {
    #[serde(alias = "acq_time", alias = "timestamp")]
    time: RawTime,
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude")]
    lon: f64,
    #[serde(default)]
    frp: Option<f64>,
    // upstream sends either a letter grade or a percentage
    #[serde(default)]
    confidence: Option<serde_json::Value>,
}

pub struct HotspotsProvider {
    mode: Mode,
    bounds: Option<Bounds>,
}

impl HotspotsProvider {
    pub fn from_fixture(json: &str) -> Self {
        Self {
            mode: Mode::Fixture(json.to_string()),
            bounds: None,
        }
    }

    pub fn from_url(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client,
            },
            bounds: None,
        }
    }
}

#[async_trait]
impl FeedAdapter for HotspotsProvider {
    fn name(&self) -> &'static str {
        HOTSPOTS
    }

    async fn fetch_interval(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, FeedError> {
        let Some(bounds) = self.bounds else {
            tracing::debug!(target: "ingest", feed = HOTSPOTS, "no bounds configured, nothing to fetch");
            return Ok(Vec::new());
        };

        let query = [
            ("from", from.timestamp().to_string()),
            ("to", to.timestamp().to_string()),
            ("bbox", bbox_param(&bounds)),
        ];
        let records = self.mode.records(&query).await?;

        Ok(parse_records(HOTSPOTS, records, |r: HotspotRecord| {
            let ts = r.time.unix()?;
            if !in_range(ts, from, to) || !bounds.contains(r.lat, r.lon) {
                return None;
            }
            let confidence = r.confidence.map(|c| match c {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
            Some(Event::new(
                ts,
                EventPayload::Hotspot {
                    lat: r.lat,
                    lon: r.lon,
                    frp: r.frp,
                    confidence,
                },
            ))
        }))
    }

    fn needs_full_refetch(&self, cfg: &EntityConfig) -> bool {
        bounds_changed(self.bounds.as_ref(), cfg.bounds.as_ref())
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
        match meta {
            FeedMeta::Hotspots { bounds } => self.bounds = bounds,
            other => tracing::warn!(target: "ingest", feed = HOTSPOTS, meta = ?other, "foreign metadata ignored"),
        }
    }
}
