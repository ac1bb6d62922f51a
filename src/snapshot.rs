// src/snapshot.rs
//! On-disk snapshots, one JSON blob per (entity, feed):
//! `{ "period": {"from", "to"}, "data": [...], "meta": {...} }`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SnapshotError;
use crate::ingest::types::{Event, FeedMeta};
use crate::period::Period;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Snapshot {
    pub period: Period,
    pub data: Vec<Event>,
    #[serde(default)]
    pub meta: FeedMeta,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: Option<PathBuf>,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Store that never touches disk: loads nothing, saves are no-ops.
    pub fn disabled() -> Self {
        Self { root: None }
    }

    pub fn path_for(&self, entity: &str, feed: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|r| {
            r.join(sanitize(entity))
                .join(format!("{}.json", sanitize(feed)))
        })
    }

    /// `Ok(None)` when the feed was never persisted.
    pub fn load(&self, entity: &str, feed: &str) -> Result<Option<Snapshot>, SnapshotError> {
        let Some(path) = self.path_for(entity, feed) else {
            return Ok(None);
        };
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SnapshotError::Io { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| SnapshotError::Corrupt { path, source })
    }

    /// Write to a sibling temp file and rename over the target.
    pub async fn save(
        &self,
        entity: &str,
        feed: &str,
        snapshot: &Snapshot,
    ) -> Result<(), SnapshotError> {
        let Some(path) = self.path_for(entity, feed) else {
            return Ok(());
        };
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SnapshotError::Io { path, source }
        };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err(dir))?;
        }
        let bytes = serde_json::to_vec(snapshot).map_err(|source| SnapshotError::Corrupt {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err(&tmp))?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err(&path))?;
        Ok(())
    }
}

fn sanitize(component: &str) -> String {
    let s: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match s.as_str() {
        "" | "." | ".." => format!("_{s}"),
        _ => s,
    }
}
