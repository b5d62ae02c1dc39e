use std::fmt;

use sha2::{Digest, Sha256};

use super::Table;
use crate::error::{CacheError, Result};

/// Content hash of a table's canonical serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the canonical form of a table.
    pub fn of(table: &Table) -> Result<Self> {
        let bytes = canonical_bytes(table)?;
        Ok(Self::of_bytes(&bytes))
    }

    /// Hash bytes that are already canonical.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines and status output.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compact JSON with sorted field names. Also the on-disk format.
pub fn canonical_bytes(table: &Table) -> Result<Vec<u8>> {
    serde_json::to_vec(table).map_err(|e| CacheError::Hash(e.to_string()))
}
