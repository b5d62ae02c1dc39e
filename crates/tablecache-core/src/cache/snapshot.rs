use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::table::{Fingerprint, Table};

/// Where the live table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Network,
    Disk,
}

/// Everything about a snapshot except the data itself.
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub fingerprint: Fingerprint,
    pub fetched_at: DateTime<Utc>,
    /// Set only by policies that expire data.
    pub expires_at: Option<DateTime<Utc>>,
    pub origin: SnapshotOrigin,
    pub record_count: usize,
}

impl SnapshotMeta {
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_minutes()
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age_minutes(now);
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|deadline| now >= deadline).unwrap_or(false)
    }
}

/// A table, its index and its metadata, installed and replaced as one unit.
#[derive(Debug)]
pub struct CacheSnapshot<I> {
    pub meta: SnapshotMeta,
    pub table: Arc<Table>,
    pub index: I,
}

/// Point-in-time report for callers and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub policy: &'static str,
    pub available: bool,
    pub record_count: usize,
    pub fingerprint: Option<String>,
    pub origin: Option<SnapshotOrigin>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub age: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub cache_file: String,
}
