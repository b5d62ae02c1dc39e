//! On-disk copy of the last installed table.
//!
//! Writes go to a temporary sibling first and are renamed into place, so the
//! file on disk is always a complete table that was live at some point.
//! A scratch store owns a uniquely named file that is removed on `release()`
//! or when the store is dropped.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CacheError, Result};
use crate::table::{canonical_bytes, Table};

/// Scratch file name prefix
const SCRATCH_PREFIX: &str = "lookup_table_";

/// Scratch file name suffix
const SCRATCH_SUFFIX: &str = ".json";

#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    scratch: bool,
    released: AtomicBool,
}

impl SnapshotStore {
    /// A store whose file survives the process.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scratch: false,
            released: AtomicBool::new(false),
        }
    }

    /// Create a fresh, uniquely named scratch file in `dir`.
    pub fn scratch_in(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| CacheError::persistence(dir, e))?;

        let path = dir.join(format!("{}{}{}", SCRATCH_PREFIX, Uuid::new_v4(), SCRATCH_SUFFIX));
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| CacheError::persistence(&path, e))?;

        debug!(path = %path.display(), "Created scratch cache file");
        Ok(Self {
            path,
            scratch: true,
            released: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_scratch(&self) -> bool {
        self.scratch
    }

    /// Load the persisted table, if there is one.
    ///
    /// A missing or empty file is `Ok(None)`. The returned timestamp is the
    /// file's modification time, or now if the platform cannot report it.
    pub fn load(&self) -> Result<Option<(Table, DateTime<Utc>)>> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::persistence(&self.path, e)),
        };
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let table: Table = serde_json::from_slice(&contents)?;
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some((table, modified)))
    }

    /// Replace the persisted table atomically.
    pub fn save(&self, table: &Table) -> Result<()> {
        let bytes = canonical_bytes(table)?;
        self.write_atomic(&bytes)
    }

    fn write_atomic(&self, content: &[u8]) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| CacheError::persistence(&parent, e))?;

        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));

        let result = (|| -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(content)?;
            file.sync_all()?;
            Ok(())
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(CacheError::persistence(&temp_path, e));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            CacheError::persistence(&self.path, e)
        })
    }

    /// Delete a scratch file. No-op for persistent stores; safe to call twice.
    pub fn release(&self) -> Result<()> {
        if !self.scratch || self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed scratch cache file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::persistence(&self.path, e)),
        }
    }
}

impl Drop for SnapshotStore {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "Failed to remove scratch cache file");
        }
    }
}
