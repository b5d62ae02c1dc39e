//! Lookup indexes built once per installed snapshot.
//!
//! An `Indexer` describes how to key a table and what a lookup returns.
//! Two are provided:
//! - `PairIndexer`: multi-valued, returns every `from -> to` pair for a key
//! - `RecordIndexer`: single-valued, returns the remaining fields of one record

use std::collections::{BTreeMap, HashMap};

use super::{Record, Table};

pub trait Indexer: Send + Sync + 'static {
    type Index: Send + Sync + 'static;
    /// `Default` is what a lookup yields when no table is loaded.
    type Output: Default + Send;

    fn build(&self, table: &Table) -> Self::Index;

    fn lookup(&self, index: &Self::Index, key: &str) -> Self::Output;
}

/// Multi-valued index: `key_field -> { from_field -> to_field }`.
///
/// Records missing any of the three fields are skipped. If one key has the
/// same `from` value twice, the later record's `to` value is kept.
#[derive(Debug, Clone)]
pub struct PairIndexer {
    key_field: String,
    from_field: String,
    to_field: String,
}

impl PairIndexer {
    pub fn new(
        key_field: impl Into<String>,
        from_field: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Self {
        Self {
            key_field: key_field.into(),
            from_field: from_field.into(),
            to_field: to_field.into(),
        }
    }
}

impl Indexer for PairIndexer {
    type Index = HashMap<String, BTreeMap<String, String>>;
    type Output = BTreeMap<String, String>;

    fn build(&self, table: &Table) -> Self::Index {
        let mut index: Self::Index = HashMap::new();
        for record in table.iter() {
            let (Some(key), Some(from), Some(to)) = (
                record.get(&self.key_field),
                record.get(&self.from_field),
                record.get(&self.to_field),
            ) else {
                continue;
            };
            index
                .entry(key.to_string())
                .or_default()
                .insert(from.to_string(), to.to_string());
        }
        index
    }

    fn lookup(&self, index: &Self::Index, key: &str) -> Self::Output {
        index.get(key).cloned().unwrap_or_default()
    }
}

/// Single-valued index: `key_field -> record without key_field`.
///
/// Source data is expected to have unique keys; when it does not, the last
/// record in table order wins.
#[derive(Debug, Clone)]
pub struct RecordIndexer {
    key_field: String,
}

impl RecordIndexer {
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
        }
    }
}

impl Indexer for RecordIndexer {
    type Index = HashMap<String, Record>;
    type Output = Option<Record>;

    fn build(&self, table: &Table) -> Self::Index {
        table
            .iter()
            .filter_map(|record| {
                let key = record.get(&self.key_field)?.to_string();
                Some((key, record.without(&self.key_field)))
            })
            .collect()
    }

    fn lookup(&self, index: &Self::Index, key: &str) -> Self::Output {
        index.get(key).cloned()
    }
}
