// src/period.rs
//! Closed time interval with an "absent" state, as persisted in snapshots
//! and reported to callers as recency.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Accepts integer unix seconds, RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS`
/// (read as UTC) or a bare date.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Period {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Period {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from.min(to)),
            to: Some(to.max(from)),
        }
    }

    /// Both ends, or `None` when nothing is covered yet.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.from, self.to) {
            (Some(f), Some(t)) => Some((f, t)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bounds().is_none()
    }

    /// Smallest period spanning both. An empty side is ignored.
    pub fn hull(&self, other: &Period) -> Period {
        match (self.bounds(), other.bounds()) {
            (Some((af, at)), Some((bf, bt))) => Period::new(af.min(bf), at.max(bt)),
            (Some(_), None) => *self,
            (None, Some(_)) => *other,
            (None, None) => Period::empty(),
        }
    }

    /// `[from, to]` lies inside this period, allowing `tol` of slack on
    /// both ends.
    pub fn covers(&self, from: DateTime<Utc>, to: DateTime<Utc>, tol: Duration) -> bool {
        match self.bounds() {
            Some((cf, ct)) => cf <= from + tol && ct + tol >= to,
            None => false,
        }
    }
}
