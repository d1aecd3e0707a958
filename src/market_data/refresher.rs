use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::market_data::source::MarketDataSource;
use crate::state::market_cache::{self, MarketCacheHandle};
use crate::state::snapshot::MarketSnapshot;
use crate::telemetry;

/// Drives refreshes from both the request path and the timer loop behind
/// one staleness check and one in-flight guard. Cheap to clone.
#[derive(Clone)]
pub struct RefreshHandle {
    source: Arc<dyn MarketDataSource>,
    cache: MarketCacheHandle,
    ttl: Duration,
    /// Single-slot gate: at most one refresh in flight per process.
    gate: Arc<Mutex<()>>,
}

impl RefreshHandle {
    pub fn new(source: Arc<dyn MarketDataSource>, cache: MarketCacheHandle, ttl: Duration) -> Self {
        RefreshHandle {
            source,
            cache,
            ttl,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Current snapshot, no refresh. Never blocks on network I/O.
    pub async fn snapshot(&self) -> MarketSnapshot {
        market_cache::snapshot(&self.cache).await
    }

    /// Refreshes if the cache is stale, then returns the snapshot.
    pub async fn fresh_snapshot(&self) -> MarketSnapshot {
        self.ensure_fresh().await;
        self.snapshot().await
    }

    /// Runs one refresh cycle when the cache is stale. When a refresh is
    /// already in flight the caller skips triggering a duplicate and serves
    /// the last fully merged state instead of racing on the snapshot.
    pub async fn ensure_fresh(&self) {
        if !self.cache.read().await.is_stale(Instant::now(), self.ttl) {
            return;
        }

        let permit = match self.gate.clone().try_lock_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("refresh already in flight, serving cached snapshot");
                return;
            }
        };

        let source = Arc::clone(&self.source);
        let cache = Arc::clone(&self.cache);
        // Spawned so the cycle runs to completion and still updates the
        // cache even if the triggering request is dropped mid-refresh.
        let task = tokio::spawn(async move {
            let _permit = permit;
            cache.write().await.note_attempt(Instant::now());
            let outcome = source.refresh().await;
            let changed = cache.write().await.apply_update(outcome, Utc::now());
            telemetry::record_refresh(changed);
            if changed {
                info!("market data refreshed");
            } else {
                debug!("refresh cycle produced no changes");
            }
        });

        if let Err(err) = task.await {
            warn!(error = %err, "refresh task panicked");
        }
    }
}

/// Timer-driven variant of the same path the request handler takes. The
/// first tick fires immediately, which doubles as the startup fetch.
pub async fn run_refresh_loop(handle: RefreshHandle, period: Duration) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        handle.ensure_fresh().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::market_data::types::{BasketAsset, FetchOutcome, Upstream};
    use crate::state::market_cache::{MarketCache, new_handle};

    const GOLD: f64 = 15_800_000_000_000.0;

    fn bitcoin_outcome() -> FetchOutcome {
        FetchOutcome {
            basket: Upstream::Success(
                [(BasketAsset::Bitcoin, 2.3e12)].into_iter().collect(),
            ),
            tracked: Upstream::NetworkError,
        }
    }

    struct CountingSource {
        calls: AtomicUsize,
        outcome: FetchOutcome,
    }

    #[async_trait]
    impl MarketDataSource for CountingSource {
        async fn refresh(&self) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    /// Increments its call count, then parks until released.
    struct BlockingSource {
        calls: AtomicUsize,
        release: Arc<Notify>,
        outcome: FetchOutcome,
    }

    #[async_trait]
    impl MarketDataSource for BlockingSource {
        async fn refresh(&self) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.outcome.clone()
        }
    }

    #[tokio::test]
    async fn test_cold_start_fetches_inside_window() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            outcome: bitcoin_outcome(),
        });
        let cache = new_handle(MarketCache::new(GOLD));
        let handle = RefreshHandle::new(source.clone(), cache, Duration::from_secs(300));

        let snap = handle.fresh_snapshot().await;
        assert_eq!(snap.market_caps.bitcoin, 2.3e12);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_refresh() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            outcome: bitcoin_outcome(),
        });
        let cache = new_handle(MarketCache::new(GOLD));
        let handle = RefreshHandle::new(source.clone(), cache, Duration::from_secs(300));

        handle.fresh_snapshot().await;
        handle.fresh_snapshot().await;
        handle.fresh_snapshot().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_still_serves_a_snapshot() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            outcome: FetchOutcome {
                basket: Upstream::NetworkError,
                tracked: Upstream::NetworkError,
            },
        });
        let cache = new_handle(MarketCache::new(GOLD));
        let handle = RefreshHandle::new(source.clone(), cache, Duration::from_secs(300));

        let snap = handle.fresh_snapshot().await;
        assert_eq!(snap.market_caps.bitcoin, 0.0);
        assert_eq!(snap.market_caps.gold, GOLD);
        assert_eq!(snap.last_updated, None);

        // Bitcoin is still at its sentinel, so the next request retries.
        handle.fresh_snapshot().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_inflight_refresh_is_not_duplicated() {
        let release = Arc::new(Notify::new());
        let source = Arc::new(BlockingSource {
            calls: AtomicUsize::new(0),
            release: release.clone(),
            outcome: bitcoin_outcome(),
        });
        let cache = new_handle(MarketCache::new(GOLD));
        let handle = RefreshHandle::new(source.clone(), cache, Duration::from_secs(300));

        let first = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.ensure_fresh().await })
        };
        // Let the first refresh take the gate and park inside the source.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Second caller finds the gate held and returns without fetching.
        handle.ensure_fresh().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        release.notify_one();
        first.await.unwrap();
        assert_eq!(handle.snapshot().await.market_caps.bitcoin, 2.3e12);
    }
}
