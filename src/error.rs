// src/error.rs
//! Error taxonomy shared by the cache, the feeds and the query path.
//!
//! A concurrent `update` is not an error: it surfaces as
//! [`crate::cache::UpdateOutcome::Skipped`].

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a feed adapter while talking to its upstream.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed upstream response: {0}")]
    Body(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Body(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot {path} unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("fetch failed for {entity}/{feed}: {source}")]
    FetchFailed {
        entity: String,
        feed: String,
        #[source]
        source: FeedError,
    },
}

/// Entity or feed definition that cannot be used. Only the offending
/// entity/feed is skipped.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("entity file {path}: {reason}")]
    InvalidEntity { path: PathBuf, reason: String },

    #[error("feed '{feed}' of entity '{entity}' is not registered")]
    UnknownFeed { entity: String, feed: String },

    #[error("cannot restore {entity}/{feed}: {source}")]
    Snapshot {
        entity: String,
        feed: String,
        #[source]
        source: SnapshotError,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown entity '{0}'")]
    EntityNotFound(String),

    #[error("feeds not enabled for this entity: {}", .0.join(", "))]
    UnknownFeeds(Vec<String>),
}
