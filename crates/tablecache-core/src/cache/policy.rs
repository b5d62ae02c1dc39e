//! Invalidation policies.
//!
//! A policy decides when the live snapshot must be refreshed, whether a
//! freshly fetched table should replace it, and what a failed pull-through
//! refresh means for the reader:
//!
//! - `HashComparison`: a background task refreshes on a fixed interval; a
//!   fetched table is installed only if its fingerprint differs from the live
//!   one. Failures keep serving the live snapshot.
//! - `Expiry`: the read path refreshes once the TTL has lapsed; any
//!   successful fetch is installed. Failures are returned to the reader.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::snapshot::SnapshotMeta;
use crate::config::MAX_INTERVAL_SECS;
use crate::table::Fingerprint;

/// What a reader gets when a pull-through refresh fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Keep answering from the live snapshot.
    ServeStale,
    /// Return the refresh error to the caller of `lookup`.
    Propagate,
}

pub trait InvalidationPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Checked on every lookup before answering.
    fn needs_refresh(&self, live: Option<&SnapshotMeta>, now: DateTime<Utc>) -> bool;

    /// Whether a fetched table with `fetched` should replace the live one.
    fn accepts(&self, live: Option<&Fingerprint>, fetched: &Fingerprint) -> bool;

    /// Deadline for a snapshot installed at `installed_at`.
    fn expires_at(&self, installed_at: DateTime<Utc>) -> Option<DateTime<Utc>>;

    fn on_refresh_failure(&self) -> FailureMode;

    /// Period for the background refresh task, if this policy uses one.
    fn refresh_interval(&self) -> Option<Duration>;
}

#[derive(Debug, Clone)]
pub struct HashComparison {
    interval: Duration,
}

impl HashComparison {
    /// `interval` is capped at `MAX_INTERVAL_SECS`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.min(Duration::from_secs(MAX_INTERVAL_SECS)),
        }
    }
}

impl InvalidationPolicy for HashComparison {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn needs_refresh(&self, _live: Option<&SnapshotMeta>, _now: DateTime<Utc>) -> bool {
        // Readers never touch the network under this policy
        false
    }

    fn accepts(&self, live: Option<&Fingerprint>, fetched: &Fingerprint) -> bool {
        live != Some(fetched)
    }

    fn expires_at(&self, _installed_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }

    fn on_refresh_failure(&self) -> FailureMode {
        FailureMode::ServeStale
    }

    fn refresh_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }
}

#[derive(Debug, Clone)]
pub struct Expiry {
    ttl: chrono::Duration,
}

impl Expiry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        }
    }
}

impl InvalidationPolicy for Expiry {
    fn name(&self) -> &'static str {
        "expiry"
    }

    fn needs_refresh(&self, live: Option<&SnapshotMeta>, now: DateTime<Utc>) -> bool {
        match live {
            Some(meta) => meta.is_expired(now),
            None => true,
        }
    }

    fn accepts(&self, _live: Option<&Fingerprint>, _fetched: &Fingerprint) -> bool {
        true
    }

    fn expires_at(&self, installed_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        installed_at.checked_add_signed(self.ttl)
    }

    fn on_refresh_failure(&self) -> FailureMode {
        FailureMode::Propagate
    }

    fn refresh_interval(&self) -> Option<Duration> {
        None
    }
}
