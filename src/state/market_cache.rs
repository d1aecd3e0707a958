use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::market_data::types::{BasketAsset, BasketCaps, FetchOutcome, TrackedUpdate, Upstream};
use crate::state::snapshot::MarketSnapshot;

/// Last-known-good market data for the process lifetime.
///
/// Created once at startup, mutated in place by each refresh cycle, never
/// torn down. The merge is conservative: a failed or partial fetch never
/// blanks a previously populated field.
pub struct MarketCache {
    snapshot: MarketSnapshot,
    /// When a refresh was last *attempted*, success or not. Drives the
    /// staleness window so a dead upstream is not re-hit on every request.
    last_attempt: Option<Instant>,
    /// Whether the stored circulating supply came from the derived
    /// marketCap / price fallback rather than the detail endpoint.
    supply_is_estimate: bool,
}

impl MarketCache {
    pub fn new(gold_market_cap: f64) -> Self {
        MarketCache {
            snapshot: MarketSnapshot::new(gold_market_cap),
            last_attempt: None,
            supply_is_estimate: false,
        }
    }

    /// Current snapshot. A clone, so readers never observe a merge midway.
    pub fn snapshot(&self) -> MarketSnapshot {
        self.snapshot.clone()
    }

    /// True once the staleness window has elapsed since the last refresh
    /// attempt. A cache that has never populated bitcoin is always stale,
    /// which forces a refresh attempt on cold start even inside the window.
    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        if self.snapshot.market_caps.bitcoin == 0.0 {
            return true;
        }
        match self.last_attempt {
            Some(at) => now.duration_since(at) > ttl,
            None => true,
        }
    }

    pub fn note_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// Merges one refresh cycle's outcome, field by field. Returns whether
    /// anything changed; `last_updated` moves only when something did.
    pub fn apply_update(&mut self, outcome: FetchOutcome, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        match outcome.basket {
            Upstream::Success(caps) => changed |= self.merge_basket(&caps),
            Upstream::RateLimited => debug!("basket call rate limited, keeping cached caps"),
            Upstream::NetworkError => debug!("basket call failed, keeping cached caps"),
        }

        match outcome.tracked {
            Upstream::Success(update) => changed |= self.merge_tracked(&update),
            Upstream::RateLimited => debug!("tracked-asset call rate limited, keeping cached data"),
            Upstream::NetworkError => debug!("tracked-asset call failed, keeping cached data"),
        }

        if changed {
            self.snapshot.last_updated = Some(now);
        }
        changed
    }

    fn merge_basket(&mut self, caps: &BasketCaps) -> bool {
        let mut changed = false;
        for asset in BasketAsset::ALL {
            if let Some(&cap) = caps.get(&asset) {
                let slot = match asset {
                    BasketAsset::Bitcoin => &mut self.snapshot.market_caps.bitcoin,
                    BasketAsset::Ethereum => &mut self.snapshot.market_caps.ethereum,
                    BasketAsset::Solana => &mut self.snapshot.market_caps.solana,
                    BasketAsset::Polkadot => &mut self.snapshot.market_caps.polkadot,
                    BasketAsset::Litecoin => &mut self.snapshot.market_caps.litecoin,
                };
                changed |= merge_positive(slot, Some(cap));
            }
        }
        changed
    }

    fn merge_tracked(&mut self, update: &TrackedUpdate) -> bool {
        let nock = &mut self.snapshot.nock;
        let mut changed = false;

        changed |= merge_positive(&mut nock.price, update.price);
        changed |= merge_positive(&mut nock.market_cap, update.market_cap);
        changed |= merge_positive(&mut nock.max_supply, update.max_supply);

        // Signed percentage: zero and negative are real values, so presence
        // alone is enough to merge.
        if let Some(v) = update.price_change_24h {
            if nock.price_change_24h != v {
                nock.price_change_24h = v;
                changed = true;
            }
        }

        // A derived estimate never replaces an exact value from the detail
        // endpoint; it may fill an empty slot or refresh an older estimate.
        if let Some(v) = update.circulating_supply {
            if v > 0.0 {
                let stored_exact = nock.circulating_supply > 0.0 && !self.supply_is_estimate;
                if !update.supply_is_estimate || !stored_exact {
                    if nock.circulating_supply != v {
                        nock.circulating_supply = v;
                        changed = true;
                    }
                    self.supply_is_estimate = update.supply_is_estimate;
                } else {
                    debug!(
                        estimate = v,
                        exact = nock.circulating_supply,
                        "ignoring estimated supply over exact value"
                    );
                }
            }
        }

        changed
    }
}

/// Overwrite only with a present, positive value; zero from upstream means
/// "no data", not a price of zero.
fn merge_positive(slot: &mut f64, value: Option<f64>) -> bool {
    match value {
        Some(v) if v > 0.0 && *slot != v => {
            *slot = v;
            true
        }
        _ => false,
    }
}

pub type MarketCacheHandle = Arc<RwLock<MarketCache>>;

pub fn new_handle(cache: MarketCache) -> MarketCacheHandle {
    Arc::new(RwLock::new(cache))
}

pub async fn snapshot(handle: &MarketCacheHandle) -> MarketSnapshot {
    handle.read().await.snapshot()
}
