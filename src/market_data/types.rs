use std::collections::HashMap;

/// The comparison assets for which only market cap is tracked.
/// Gold is configuration, not a fetched asset, so it is not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasketAsset {
    Bitcoin,
    Ethereum,
    Solana,
    Polkadot,
    Litecoin,
}

impl BasketAsset {
    pub const ALL: [BasketAsset; 5] = [
        BasketAsset::Bitcoin,
        BasketAsset::Ethereum,
        BasketAsset::Solana,
        BasketAsset::Polkadot,
        BasketAsset::Litecoin,
    ];

    /// CoinGecko coin id, as used in the `ids=` query parameter and as the
    /// top-level key of a simple/price response.
    pub fn id(&self) -> &'static str {
        match self {
            BasketAsset::Bitcoin => "bitcoin",
            BasketAsset::Ethereum => "ethereum",
            BasketAsset::Solana => "solana",
            BasketAsset::Polkadot => "polkadot",
            BasketAsset::Litecoin => "litecoin",
        }
    }
}

/// Classification of a single upstream call.
///
/// Partial success is not a variant: a `Success` payload carries `Option`
/// fields (or a sparse map) and the merge decides field by field.
#[derive(Debug, Clone, PartialEq)]
pub enum Upstream<T> {
    Success(T),
    /// Upstream explicitly throttling. Transient; keep serving the cache.
    RateLimited,
    /// Transport failure, timeout, or unparseable body.
    NetworkError,
}

/// Market caps for whichever basket assets the upstream actually returned.
/// A missing asset means "no update", never zero.
pub type BasketCaps = HashMap<BasketAsset, f64>;

/// Fields extracted for the tracked asset. `None` means the upstream did not
/// return the field; the cache keeps its prior value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedUpdate {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub price_change_24h: Option<f64>,
    /// True when `circulating_supply` was derived as marketCap / price on the
    /// fallback path rather than reported by the detail endpoint.
    pub supply_is_estimate: bool,
}

/// One refresh cycle's result, merged atomically into the cache.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub basket: Upstream<BasketCaps>,
    pub tracked: Upstream<TrackedUpdate>,
}
