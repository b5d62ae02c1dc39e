//! Snapshot cache over the remote reference table.
//!
//! This module provides the `TableCache` for answering point lookups
//! without a network round trip per query. Exactly one `CacheSnapshot` is
//! live at a time and refreshes replace it whole.
//!
//! Invalidation is pluggable (`InvalidationPolicy`):
//! - `HashComparison`: periodic background refresh via `RefreshTask`,
//!   installs only when the content fingerprint changes
//! - `Expiry`: pull-through refresh on lookup once the TTL has lapsed
//!
//! The last installed table is persisted by a `SnapshotStore`.

pub mod policy;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod table_cache;

#[cfg(test)]
pub(crate) mod testing;

pub use policy::{Expiry, FailureMode, HashComparison, InvalidationPolicy};
pub use scheduler::RefreshTask;
pub use snapshot::{CacheSnapshot, CacheStatus, SnapshotMeta, SnapshotOrigin};
pub use store::SnapshotStore;
pub use table_cache::{RefreshOutcome, TableCache};
