// src/ingest/providers/flights.rs
//! Aircraft position reports (tankers, air attack, news helicopters)
//! inside the entity's bounding box.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{bbox_param, bounds_changed, in_range, parse_records, Mode, RawTime, FLIGHTS};
use crate::error::FeedError;
use crate::ingest::config::{Bounds, EntityConfig};
use crate::ingest::types::{Event, EventPayload, FeedAdapter, FeedMeta};

#[derive(Debug, Deserialize)]
struct FlightRecord {
    #[serde(alias = "ts")]
    time: RawTime,
    #[serde(alias = "flight")]
    callsign: String,
    lat: f64,
    lon: f64,
    #[serde(default, alias = "alt")]
    altitude_m: Option<f64>,
}

pub struct FlightsProvider {
    mode: Mode,
    bounds: Option<Bounds>,
}

impl FlightsProvider {
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
impl FeedAdapter for FlightsProvider {
    fn name(&self) -> &'static str {
        FLIGHTS
    }

    async fn fetch_interval(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, FeedError> {
        let Some(bounds) = self.bounds else {
            return Ok(Vec::new());
        };

        let query = [
            ("from", from.timestamp().to_string()),
            ("to", to.timestamp().to_string()),
            ("bbox", bbox_param(&bounds)),
        ];
        let records = self.mode.records(&query).await?;

        Ok(parse_records(FLIGHTS, records, |r: FlightRecord| {
            let ts = r.time.unix()?;
            let callsign = r.callsign.trim().to_string();
            if callsign.is_empty() || !in_range(ts, from, to) || !bounds.contains(r.lat, r.lon) {
                return None;
            }
            Some(Event::new(
                ts,
                EventPayload::Flight {
                    callsign,
                    lat: r.lat,
                    lon: r.lon,
                    altitude_m: r.altitude_m,
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
        FeedMeta::Flights {
            bounds: self.bounds,
        }
    }

    fn restore_state(&mut self, meta: FeedMeta) {
        match meta {
            FeedMeta::Flights { bounds } => self.bounds = bounds,
            other => tracing::warn!(target: "ingest", feed = FLIGHTS, meta = ?other, "foreign metadata ignored"),
        }
    }
}
