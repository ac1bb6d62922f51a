// src/query.rs
//! On-demand read path: resolve the requested window and feed subset,
//! slice each feed's cache and fold the slices into one timeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::QueryError;
use crate::ingest::types::Event;
use crate::merge::merge_all;
use crate::period::{parse_instant, Period};
use crate::registry::Registry;

/// Raw request parameters as they arrive from the transport.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    /// Comma-separated feed names.
    #[serde(default)]
    pub only: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryResponse {
    pub events: Vec<Event>,
    /// Covered interval per selected feed.
    pub recency: BTreeMap<String, Period>,
    /// Feeds that were mid-fetch, so their events may be stale.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fetching: Vec<String>,
}

pub fn query(
    registry: &Registry,
    entity: &str,
    params: &QueryParams,
) -> Result<QueryResponse, QueryError> {
    query_at(registry, entity, params, Utc::now())
}

pub fn query_at(
    registry: &Registry,
    entity: &str,
    params: &QueryParams,
    now: DateTime<Utc>,
) -> Result<QueryResponse, QueryError> {
    let cfg = registry
        .entity(entity)
        .ok_or_else(|| QueryError::EntityNotFound(entity.to_string()))?;

    let feeds = select_feeds(&cfg.feeds, params.only.as_deref())?;

    let from = params
        .from
        .as_deref()
        .and_then(parse_instant)
        .unwrap_or(cfg.start);
    let to = params.to.as_deref().and_then(parse_instant).unwrap_or(now);

    let mut recency = BTreeMap::new();
    let mut fetching = Vec::new();
    let mut slices = Vec::with_capacity(feeds.len());
    for feed in feeds {
        match registry.cache(&cfg.id, &feed) {
            Some(cache) => {
                let slice = cache.get_data(from, to);
                if slice.fetch_in_progress {
                    fetching.push(feed.clone());
                }
                recency.insert(feed, cache.current_coverage());
                slices.push(slice.events);
            }
            None => {
                recency.insert(feed, Period::empty());
            }
        }
    }

    Ok(QueryResponse {
        events: merge_all(slices),
        recency,
        fetching,
    })
}

/// Enabled feeds in declared order, narrowed by `only` when it names any.
fn select_feeds(enabled: &[String], only: Option<&str>) -> Result<Vec<String>, QueryError> {
    let requested: Vec<&str> = only
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if requested.is_empty() {
        return Ok(enabled.to_vec());
    }

    let mut invalid: Vec<String> = Vec::new();
    for name in &requested {
        if !enabled.iter().any(|f| f == name) && !invalid.iter().any(|i| i == name) {
            invalid.push(name.to_string());
        }
    }
    if !invalid.is_empty() {
        return Err(QueryError::UnknownFeeds(invalid));
    }

    Ok(enabled
        .iter()
        .filter(|f| requested.contains(&f.as_str()))
        .cloned()
        .collect())
}
