//! Locally cached copy of a remote reference table.
//!
//! `tablecache-core` fetches a JSON table of flat records over HTTP, keeps
//! it in memory behind an atomically swapped snapshot, persists it to disk,
//! and answers point lookups without touching the network.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod source;
pub mod table;

pub use cache::{
    CacheStatus, Expiry, HashComparison, InvalidationPolicy, RefreshOutcome, RefreshTask,
    SnapshotOrigin, SnapshotStore, TableCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, PolicyKind};
pub use error::{CacheError, FailureKind, Result};
pub use source::{HttpSource, PayloadShape, TableSource};
pub use table::{Fingerprint, Indexer, PairIndexer, Record, RecordIndexer, Table};
