// src/ingest/providers/weather.rs
//! Weather reports from the entity's reference station.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{in_range, parse_records, Mode, RawTime, WEATHER};
use crate::error::FeedError;
use crate::ingest::config::EntityConfig;
use crate::ingest::types::{Event, EventPayload, FeedAdapter, FeedMeta};

#[derive(Debug, Deserialize)]
struct WeatherRecord {
    #[serde(alias = "valid", alias = "observed_at")]
    time: RawTime,
    #[serde(default)]
    station: Option<String>,
    #[serde(default, alias = "tmpc")]
    temperature_c: Option<f64>,
    #[serde(default, alias = "sknt_kph")]
    wind_speed_kph: Option<f64>,
    #[serde(default, alias = "drct")]
    wind_dir_deg: Option<f64>,
    #[serde(default, alias = "metar")]
    raw: Option<String>,
}

pub struct WeatherProvider {
    mode: Mode,
    station: Option<String>,
}

impl WeatherProvider {
    pub fn from_fixture(json: &str) -> Self {
        Self {
            mode: Mode::Fixture(json.to_string()),
            station: None,
        }
    }

    pub fn from_url(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client,
            },
            station: None,
        }
    }
}

fn normalize_station(s: Option<&str>) -> Option<String> {
    s.map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl FeedAdapter for WeatherProvider {
    fn name(&self) -> &'static str {
        WEATHER
    }

    async fn fetch_interval(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, FeedError> {
        let Some(station) = self.station.clone() else {
            tracing::debug!(target: "ingest", feed = WEATHER, "no station configured, nothing to fetch");
            return Ok(Vec::new());
        };

        let query = [
            ("from", from.timestamp().to_string()),
            ("to", to.timestamp().to_string()),
            ("station", station.clone()),
        ];
        let records = self.mode.records(&query).await?;

        Ok(parse_records(WEATHER, records, |r: WeatherRecord| {
            let ts = r.time.unix()?;
            let rec_station =
                normalize_station(r.station.as_deref()).unwrap_or_else(|| station.clone());
            if !in_range(ts, from, to) || rec_station != station {
                return None;
            }
            Some(Event::new(
                ts,
                EventPayload::Weather {
                    station: rec_station,
                    temperature_c: r.temperature_c,
                    wind_speed_kph: r.wind_speed_kph,
                    wind_dir_deg: r.wind_dir_deg,
                    raw: r.raw,
                },
            ))
        }))
    }

    fn needs_full_refetch(&self, cfg: &EntityConfig) -> bool {
        self.station != normalize_station(cfg.station.as_deref())
    }

    fn reinitialize(&mut self, cfg: &EntityConfig) {
        self.station = normalize_station(cfg.station.as_deref());
    }

    fn describe_state(&self) -> FeedMeta {
        FeedMeta::Weather {
            station: self.station.clone(),
        }
    }

    fn restore_state(&mut self, meta: FeedMeta) {
        match meta {
            FeedMeta::Weather { station } => self.station = normalize_station(station.as_deref()),
            other => tracing::warn!(target: "ingest", feed = WEATHER, meta = ?other, "foreign metadata ignored"),
        }
    }
}
