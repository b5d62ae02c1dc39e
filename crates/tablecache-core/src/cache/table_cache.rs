//! Lookup cache over a remotely published table.
//!
//! One snapshot is live at a time. Readers clone its Arc under a short read
//! lock and answer from that snapshot alone; refresh builds a complete new
//! snapshot off to the side and swaps the Arc under the write lock. Refreshes
//! are serialised by an async mutex, which is never held by readers unless the
//! policy asks for a pull-through refresh. Pull-through callers that queued
//! behind an attempt take that attempt's result instead of fetching again.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::policy::{Expiry, FailureMode, HashComparison, InvalidationPolicy};
use super::scheduler::RefreshTask;
use super::snapshot::{CacheSnapshot, CacheStatus, SnapshotMeta, SnapshotOrigin};
use super::store::SnapshotStore;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, PolicyKind};
use crate::error::{CacheError, Result};
use crate::source::{HttpSource, TableSource};
use crate::table::{Fingerprint, Indexer, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was installed.
    Updated(Fingerprint),
    /// The fetched table matched the live one; nothing was written.
    Unchanged,
}

pub struct TableCache<X: Indexer> {
    inner: Arc<Inner<X>>,
}

impl<X: Indexer> Clone for TableCache<X> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<X: Indexer> {
    source: Arc<dyn TableSource>,
    store: SnapshotStore,
    policy: Arc<dyn InvalidationPolicy>,
    indexer: X,
    clock: Arc<dyn Clock>,
    live: RwLock<Option<Arc<CacheSnapshot<X::Index>>>>,
    refresh_lock: Mutex<AttemptLog>,
    /// Completed refresh attempts. Only advanced while `refresh_lock` is held.
    attempts: AtomicU64,
    closed: AtomicBool,
}

/// Outcome of the most recent refresh attempt, guarded by `refresh_lock`.
#[derive(Default)]
struct AttemptLog {
    last_failure: Option<CacheError>,
}

impl<X: Indexer> TableCache<X> {
    pub fn new(
        source: Arc<dyn TableSource>,
        store: SnapshotStore,
        policy: Arc<dyn InvalidationPolicy>,
        indexer: X,
    ) -> Self {
        Self::with_clock(source, store, policy, indexer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        source: Arc<dyn TableSource>,
        store: SnapshotStore,
        policy: Arc<dyn InvalidationPolicy>,
        indexer: X,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                policy,
                indexer,
                clock,
                live: RwLock::new(None),
                refresh_lock: Mutex::new(AttemptLog::default()),
                attempts: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Build and initialize a cache as described by `config`.
    ///
    /// The hash policy persists to `config.cache_path()` and always succeeds,
    /// possibly with no data. The expiry policy uses a fresh scratch file in
    /// the temp directory and fails if the first fetch fails; the scratch
    /// file is removed in that case.
    pub async fn open(config: &Config, indexer: X) -> Result<Self> {
        let source: Arc<dyn TableSource> = Arc::new(HttpSource::from_config(config)?);
        let cache = match config.policy {
            PolicyKind::Hash => Self::new(
                source,
                SnapshotStore::persistent(config.cache_path()),
                Arc::new(HashComparison::new(Duration::from_secs(
                    config.refresh_interval_secs,
                ))),
                indexer,
            ),
            PolicyKind::Expiry => Self::new(
                source,
                SnapshotStore::scratch_in(&std::env::temp_dir())?,
                Arc::new(Expiry::new(Duration::from_secs(config.ttl_secs))),
                indexer,
            ),
        };
        cache.initialize().await?;
        Ok(cache)
    }

    /// Install the first snapshot.
    ///
    /// Fetches from the source; if the persisted copy has the same
    /// fingerprint it is installed as-is, otherwise the fetched table is
    /// installed and written to disk. If the fetch fails the persisted copy
    /// is used when there is one. With neither, the cache stays empty and
    /// `Ok(None)` is returned, unless the policy propagates failures.
    pub async fn initialize(&self) -> Result<Option<SnapshotOrigin>> {
        let mut log = self.inner.refresh_lock.lock().await;
        let result = self.initialize_locked().await;
        self.record_attempt(&mut log, result.as_ref().err());
        result
    }

    async fn initialize_locked(&self) -> Result<Option<SnapshotOrigin>> {
        self.ensure_open()?;
        let started = Instant::now();

        let fetched = match self.inner.source.fetch().await {
            Ok(table) => Fingerprint::of(&table).map(|fingerprint| (table, fingerprint)),
            Err(e) => Err(e),
        };

        match fetched {
            Ok((table, fingerprint)) => {
                let now = self.inner.clock.now();
                let on_disk = self
                    .load_persisted()
                    .filter(|(_, _, disk_fingerprint)| *disk_fingerprint == fingerprint);

                let origin = match on_disk {
                    Some((disk_table, _, disk_fingerprint)) => {
                        self.install(Arc::new(disk_table), disk_fingerprint, now, SnapshotOrigin::Disk);
                        info!(
                            records = table.len(),
                            fingerprint = fingerprint.short(),
                            "Cache loaded from disk"
                        );
                        SnapshotOrigin::Disk
                    }
                    None => {
                        let table = Arc::new(table);
                        self.install(Arc::clone(&table), fingerprint.clone(), now, SnapshotOrigin::Network);
                        self.persist(&table);
                        info!(
                            records = table.len(),
                            fingerprint = fingerprint.short(),
                            "Cache updated from source"
                        );
                        SnapshotOrigin::Network
                    }
                };
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Lookup table loaded");
                Ok(Some(origin))
            }
            Err(e) => {
                warn!(
                    source = %self.inner.source.describe(),
                    error = %e,
                    kind = ?e.kind(),
                    "Unable to load lookup table from source"
                );

                if let Some((table, modified, fingerprint)) = self.load_persisted() {
                    info!(
                        records = table.len(),
                        fingerprint = fingerprint.short(),
                        path = %self.inner.store.path().display(),
                        "Falling back to cached copy on disk"
                    );
                    self.install(Arc::new(table), fingerprint, modified, SnapshotOrigin::Disk);
                    return Ok(Some(SnapshotOrigin::Disk));
                }

                match self.inner.policy.on_refresh_failure() {
                    FailureMode::ServeStale => {
                        warn!("No lookup table available; lookups will return no data");
                        Ok(None)
                    }
                    FailureMode::Propagate => Err(e),
                }
            }
        }
    }

    /// Fetch from the source and install the result if the policy accepts it.
    ///
    /// On failure the live snapshot is left untouched.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let mut log = self.inner.refresh_lock.lock().await;
        let result = self.refresh_locked().await;
        self.record_attempt(&mut log, result.as_ref().err());
        result
    }

    /// Answer a lookup from the live snapshot.
    ///
    /// Returns the indexer's empty output when no table is loaded. Only a
    /// policy that refreshes on the read path can make this fail.
    pub async fn lookup(&self, key: &str) -> Result<X::Output> {
        let live = self.snapshot();
        let now = self.inner.clock.now();

        if self
            .inner
            .policy
            .needs_refresh(live.as_ref().map(|s| &s.meta), now)
        {
            if let Err(e) = self.refresh_if_stale().await {
                match self.inner.policy.on_refresh_failure() {
                    FailureMode::Propagate => return Err(e),
                    FailureMode::ServeStale => {}
                }
            }
        }

        Ok(self.lookup_live(key))
    }

    /// Look up against whatever is installed right now, never refreshing.
    pub fn lookup_live(&self, key: &str) -> X::Output {
        match self.snapshot() {
            Some(snapshot) => self.inner.indexer.lookup(&snapshot.index, key),
            None => X::Output::default(),
        }
    }

    /// The live snapshot, for callers that need several consistent reads.
    pub fn snapshot(&self) -> Option<Arc<CacheSnapshot<X::Index>>> {
        self.inner
            .live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_available(&self) -> bool {
        self.snapshot().is_some()
    }

    /// True once `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn policy_name(&self) -> &'static str {
        self.inner.policy.name()
    }

    pub fn cache_file(&self) -> &Path {
        self.inner.store.path()
    }

    pub fn status(&self) -> CacheStatus {
        let now = self.inner.clock.now();
        let live = self.snapshot();
        let meta = live.as_ref().map(|s| &s.meta);

        CacheStatus {
            policy: self.inner.policy.name(),
            available: meta.is_some(),
            record_count: meta.map(|m| m.record_count).unwrap_or(0),
            fingerprint: meta.map(|m| m.fingerprint.to_string()),
            origin: meta.map(|m| m.origin),
            fetched_at: meta.map(|m| m.fetched_at),
            age: meta
                .map(|m| m.age_display(now))
                .unwrap_or_else(|| "never".to_string()),
            expires_at: meta.and_then(|m| m.expires_at),
            cache_file: self.inner.store.path().display().to_string(),
        }
    }

    /// Start the background refresh task if the policy uses one.
    pub fn spawn_refresh(&self) -> Option<RefreshTask> {
        self.inner
            .policy
            .refresh_interval()
            .map(|period| RefreshTask::spawn(self.clone(), period))
    }

    /// Drop the live snapshot and release the scratch file, if any.
    ///
    /// Waits for an in-flight refresh to finish first. Later refreshes fail
    /// with `Unavailable`.
    pub async fn close(&self) -> Result<()> {
        let _guard = self.inner.refresh_lock.lock().await;
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.inner.live.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.inner.store.release()?;
        debug!(policy = self.inner.policy.name(), "Cache closed");
        Ok(())
    }

    // ===== Internals =====

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(CacheError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// Pull-through refresh. At most one fetch runs per burst of stale
    /// reads: a caller that waited on the lock while an attempt completed
    /// gets that attempt's failure rather than starting another fetch.
    async fn refresh_if_stale(&self) -> Result<()> {
        let seen = self.inner.attempts.load(Ordering::SeqCst);
        let mut log = self.inner.refresh_lock.lock().await;

        if self.inner.attempts.load(Ordering::SeqCst) != seen {
            if let Some(ref failure) = log.last_failure {
                return Err(failure.shared_copy());
            }
        }

        // Another reader may have refreshed while we waited for the lock
        let live = self.snapshot();
        let now = self.inner.clock.now();
        if !self
            .inner
            .policy
            .needs_refresh(live.as_ref().map(|s| &s.meta), now)
        {
            return Ok(());
        }

        let result = self.refresh_locked().await;
        self.record_attempt(&mut log, result.as_ref().err());
        result.map(|_| ())
    }

    /// Caller must hold `refresh_lock`, passing its guard's contents as `log`.
    fn record_attempt(&self, log: &mut AttemptLog, failure: Option<&CacheError>) {
        log.last_failure = failure.map(CacheError::shared_copy);
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
    }

    /// Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<RefreshOutcome> {
        let result = self.fetch_and_install().await;
        if let Err(ref e) = result {
            warn!(
                source = %self.inner.source.describe(),
                error = %e,
                kind = ?e.kind(),
                "Unable to refresh cache from source"
            );
        }
        result
    }

    async fn fetch_and_install(&self) -> Result<RefreshOutcome> {
        self.ensure_open()?;
        let started = Instant::now();

        let table = self.inner.source.fetch().await?;
        let fingerprint = Fingerprint::of(&table)?;

        let live = self.snapshot();
        let live_fingerprint = live.as_ref().map(|s| &s.meta.fingerprint);

        if !self.inner.policy.accepts(live_fingerprint, &fingerprint) {
            debug!(
                fingerprint = fingerprint.short(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Lookup table unchanged"
            );
            return Ok(RefreshOutcome::Unchanged);
        }

        let now = self.inner.clock.now();
        let table = Arc::new(table);
        self.install(Arc::clone(&table), fingerprint.clone(), now, SnapshotOrigin::Network);
        self.persist(&table);

        info!(
            records = table.len(),
            fingerprint = fingerprint.short(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache updated from source"
        );
        Ok(RefreshOutcome::Updated(fingerprint))
    }

    /// Build a complete snapshot, then swap it in.
    fn install(
        &self,
        table: Arc<Table>,
        fingerprint: Fingerprint,
        fetched_at: DateTime<Utc>,
        origin: SnapshotOrigin,
    ) {
        let snapshot = Arc::new(CacheSnapshot {
            meta: SnapshotMeta {
                fingerprint,
                fetched_at,
                expires_at: self.inner.policy.expires_at(fetched_at),
                origin,
                record_count: table.len(),
            },
            index: self.inner.indexer.build(&table),
            table,
        });

        *self.inner.live.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Best effort: the in-memory table is served whether or not this succeeds.
    fn persist(&self, table: &Table) {
        if let Err(e) = self.inner.store.save(table) {
            warn!(error = %e, "Unable to save lookup table to cache file");
        }
    }

    fn load_persisted(&self) -> Option<(Table, DateTime<Utc>, Fingerprint)> {
        let loaded = self.inner.store.load().and_then(|found| {
            found
                .map(|(table, modified)| {
                    Fingerprint::of(&table).map(|fingerprint| (table, modified, fingerprint))
                })
                .transpose()
        });

        match loaded {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    path = %self.inner.store.path().display(),
                    error = %e,
                    "Unable to load lookup table from cache file"
                );
                None
            }
        }
    }
}
