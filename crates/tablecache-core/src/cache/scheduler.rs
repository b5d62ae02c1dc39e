use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::table_cache::{RefreshOutcome, TableCache};
use crate::config::MAX_INTERVAL_SECS;
use crate::table::Indexer;

/// Background task that refreshes a cache on a fixed period until shut down.
pub struct RefreshTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    /// Start refreshing `cache` every `period`. The first refresh happens one
    /// period from now, since the cache was just initialized. The task ends
    /// on its own once the cache is closed.
    pub fn spawn<X: Indexer>(cache: TableCache<X>, period: Duration) -> Self {
        let period = period.min(Duration::from_secs(MAX_INTERVAL_SECS));
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            info!(period_secs = period.as_secs(), "Starting background refresh");
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // A fetch in flight is abandoned on shutdown; nothing is installed mid-fetch
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    outcome = cache.refresh() => match outcome {
                        Ok(RefreshOutcome::Updated(fingerprint)) => {
                            debug!(fingerprint = fingerprint.short(), "Scheduled refresh installed new table");
                        }
                        Ok(RefreshOutcome::Unchanged) => {}
                        Err(_) if cache.is_closed() => {
                            debug!("Cache closed");
                            break;
                        }
                        // Already logged by refresh(); live snapshot is untouched
                        Err(_) => {}
                    }
                }
            }
            debug!("Background refresh stopped");
        });

        Self { token, handle }
    }

    /// Token that stops the task when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Background refresh task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::policy::{Expiry, HashComparison};
    use crate::cache::store::SnapshotStore;
    use crate::cache::testing::FakeSource;
    use crate::table::PairIndexer;

    const E1: &str = r#"[{"country":"US","branch":"B1","legal_entity":"E1"}]"#;
    const E2: &str = r#"[{"country":"US","branch":"B1","legal_entity":"E2"}]"#;

    fn cache(source: &Arc<FakeSource>, dir: &std::path::Path) -> TableCache<PairIndexer> {
        TableCache::new(
            source.clone(),
            SnapshotStore::persistent(dir.join("table.json")),
            Arc::new(HashComparison::new(Duration::from_secs(60))),
            PairIndexer::new("country", "branch", "legal_entity"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_refresh_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::serving(E1);
        let cache = cache(&source, dir.path());
        cache.initialize().await.unwrap();

        let task = cache.spawn_refresh().unwrap();
        source.set(E2);

        // Nothing happens before the first period elapses
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(source.fetch_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(
            cache.lookup("US").await.unwrap().get("B1").map(String::as_str),
            Some("E2")
        );

        task.shutdown().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_refresh_recovers_from_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::offline();
        let cache = cache(&source, dir.path());
        assert_eq!(cache.initialize().await.unwrap(), None);

        let task = cache.spawn_refresh().unwrap();

        // Failed tick leaves the cache empty but the task keeps going
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!cache.is_available());
        assert!(!task.is_finished());

        source.set(E1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(cache.is_available());

        let token = task.cancellation_token();
        task.shutdown().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_refresh_stops_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::serving(E1);
        let cache = cache(&source, dir.path());
        cache.initialize().await.unwrap();

        let task = cache.spawn_refresh().unwrap();
        cache.close().await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(task.is_finished());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.fetch_count(), 1);
        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_period_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::serving(E1);
        let cache = cache(&source, dir.path());
        cache.initialize().await.unwrap();

        let task = RefreshTask::spawn(cache.clone(), Duration::MAX);
        tokio::time::sleep(Duration::from_secs(MAX_INTERVAL_SECS + 1)).await;
        assert!(!task.is_finished());
        assert_eq!(source.fetch_count(), 2);
        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_expiry_policy_has_no_background_task() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TableCache::new(
            FakeSource::serving(E1),
            SnapshotStore::scratch_in(dir.path()).unwrap(),
            Arc::new(Expiry::new(Duration::from_secs(60))),
            PairIndexer::new("country", "branch", "legal_entity"),
        );
        assert!(cache.spawn_refresh().is_none());
    }
}
