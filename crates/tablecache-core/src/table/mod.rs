//! In-memory table model.
//!
//! This module contains the data structures that a fetch produces and a
//! snapshot holds:
//!
//! - `Record`, `Table`: flat string records in source order
//! - `Fingerprint`: SHA-256 over the canonical serialized table
//! - `Indexer` implementations: `PairIndexer`, `RecordIndexer`

pub mod fingerprint;
pub mod index;
pub mod record;

pub use fingerprint::{canonical_bytes, Fingerprint};
pub use index::{Indexer, PairIndexer, RecordIndexer};
pub use record::{Record, Table};
