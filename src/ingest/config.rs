// src/ingest/config.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::ConfigError;

pub const ENV_ENTITY_CONFIG_DIR: &str = "ENTITY_CONFIG_DIR";
pub const ENV_SNAPSHOT_DIR: &str = "SNAPSHOT_DIR";
pub const ENV_REFRESH_INTERVAL_SECS: &str = "REFRESH_INTERVAL_SECS";
pub const ENV_HOTSPOTS_URL: &str = "HOTSPOTS_URL";
pub const ENV_WEATHER_URL: &str = "WEATHER_URL";
pub const ENV_FLIGHTS_URL: &str = "FLIGHTS_URL";

pub const DEFAULT_ENTITY_CONFIG_DIR: &str = "config/entities";
pub const DEFAULT_SNAPSHOT_DIR: &str = "state/snapshots";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Geographic selection box, degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Bounds {
    /// Every edge within `tol` degrees of the other box.
    pub fn approx_eq(&self, other: &Bounds, tol: f64) -> bool {
        (self.min_lat - other.min_lat).abs() <= tol
            && (self.min_lon - other.min_lon).abs() <= tol
            && (self.max_lat - other.max_lat).abs() <= tol
            && (self.max_lon - other.max_lon).abs() <= tol
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    fn is_valid(&self) -> bool {
        self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
            && (-90.0..=90.0).contains(&self.min_lat)
            && (-90.0..=90.0).contains(&self.max_lat)
            && (-180.0..=180.0).contains(&self.min_lon)
            && (-180.0..=180.0).contains(&self.max_lon)
    }
}

/// Read-only snapshot of one monitored incident, as supplied by the
/// configuration directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityConfig {
    pub id: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    /// Reference weather station.
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default)]
    pub feeds: Vec<String>,
}

impl EntityConfig {
    pub fn has_feed(&self, feed: &str) -> bool {
        self.feeds.iter().any(|f| f == feed)
    }

    fn validate(mut self, path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidEntity {
            path: path.to_path_buf(),
            reason,
        };

        self.id = self.id.trim().to_string();
        if self.id.is_empty() {
            return Err(invalid("empty id".into()));
        }
        if let Some(end) = self.end {
            if end < self.start {
                return Err(invalid(format!("end {end} precedes start {}", self.start)));
            }
        }
        if let Some(b) = &self.bounds {
            if !b.is_valid() {
                return Err(invalid(format!("bounds out of range: {b:?}")));
            }
        }

        let mut seen = HashSet::new();
        self.feeds = self
            .feeds
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty() && seen.insert(f.clone()))
            .collect();

        Ok(self)
    }
}

/// Parse one entity definition. TOML or JSON, chosen by extension.
pub fn parse_entity(path: &Path, content: &str) -> Result<EntityConfig, ConfigError> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let parsed: Result<EntityConfig, String> = match ext.as_str() {
        "toml" => toml::from_str(content).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(content).map_err(|e| e.to_string()),
        other => Err(format!("unsupported extension '{other}'")),
    };

    parsed
        .map_err(|reason| ConfigError::InvalidEntity {
            path: path.to_path_buf(),
            reason,
        })?
        .validate(path)
}

/// Load every `*.toml` / `*.json` entity in `dir` (sorted by file name).
/// Malformed files and duplicate ids are logged and skipped.
pub fn load_entities_from(dir: &Path) -> Result<Vec<EntityConfig>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("reading entity config dir {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|s| s.to_str()),
                Some("toml") | Some("json")
            )
        })
        .collect();
    paths.sort();

    let mut ids = HashSet::new();
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(target: "config", path = %path.display(), error = %e, "entity file unreadable");
                continue;
            }
        };
        match parse_entity(&path, &content) {
            Ok(cfg) => {
                if !ids.insert(cfg.id.clone()) {
                    tracing::warn!(target: "config", path = %path.display(), entity = %cfg.id, "duplicate entity id, skipped");
                    continue;
                }
                out.push(cfg);
            }
            Err(e) => tracing::warn!(target: "config", error = %e, "entity skipped"),
        }
    }
    Ok(out)
}

/// Where the scheduler gets the current entity list from on every tick.
#[async_trait]
pub trait EntitySource: Send + Sync {
    async fn load(&self) -> Result<Vec<EntityConfig>>;
}

/// Directory of entity files, re-read on every tick.
#[derive(Debug, Clone)]
pub struct DirEntitySource {
    pub dir: PathBuf,
}

impl DirEntitySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl EntitySource for DirEntitySource {
    /// Directory walk and file reads run on the blocking pool.
    async fn load(&self) -> Result<Vec<EntityConfig>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || load_entities_from(&dir))
            .await
            .context("entity config load task aborted")?
    }
}

/// In-memory entity list that can be swapped at runtime.
#[derive(Debug, Clone, Default)]
pub struct StaticEntitySource {
    inner: Arc<RwLock<Vec<EntityConfig>>>,
}

impl StaticEntitySource {
    pub fn new(entities: Vec<EntityConfig>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(entities)),
        }
    }

    pub fn set(&self, entities: Vec<EntityConfig>) {
        match self.inner.write() {
            Ok(mut g) => *g = entities,
            Err(poison) => *poison.into_inner() = entities,
        }
    }
}

#[async_trait]
impl EntitySource for StaticEntitySource {
    async fn load(&self) -> Result<Vec<EntityConfig>> {
        let g = self
            .inner
            .read()
            .map_err(|_| anyhow::anyhow!("entity source lock poisoned"))?;
        Ok(g.clone())
    }
}

/// Process-level settings, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub entity_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub refresh_interval_secs: u64,
    pub hotspots_url: Option<String>,
    pub weather_url: Option<String>,
    pub flights_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            entity_dir: non_empty(ENV_ENTITY_CONFIG_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ENTITY_CONFIG_DIR)),
            snapshot_dir: non_empty(ENV_SNAPSHOT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            refresh_interval_secs: non_empty(ENV_REFRESH_INTERVAL_SECS)
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
            hotspots_url: non_empty(ENV_HOTSPOTS_URL),
            weather_url: non_empty(ENV_WEATHER_URL),
            flights_url: non_empty(ENV_FLIGHTS_URL),
        }
    }
}
