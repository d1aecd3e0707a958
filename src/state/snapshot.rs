use chrono::{DateTime, Utc};
use serde::Serialize;

/// Wire shape served to the front end. Field names match what the
/// comparison page already consumes, hence the camelCase renames.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MarketSnapshot {
    #[serde(rename = "marketCaps")]
    pub market_caps: MarketCaps,
    pub nock: TrackedAsset,
    /// RFC 3339 timestamp of the last refresh that changed anything,
    /// null until the first successful fetch.
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// USD market caps for the comparison basket. Zero means "not fetched yet",
/// never a real value of zero.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct MarketCaps {
    pub bitcoin: f64,
    pub ethereum: f64,
    pub solana: f64,
    pub polkadot: f64,
    pub litecoin: f64,
    /// Static configuration, never updated by fetches.
    pub gold: f64,
}

/// Detailed metrics for the tracked asset.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedAsset {
    pub price: f64,
    pub market_cap: f64,
    pub circulating_supply: f64,
    /// Zero means unknown/uncapped.
    pub max_supply: f64,
    pub price_change_24h: f64,
}

impl MarketSnapshot {
    pub fn new(gold_market_cap: f64) -> Self {
        MarketSnapshot {
            market_caps: MarketCaps {
                gold: gold_market_cap,
                ..MarketCaps::default()
            },
            nock: TrackedAsset::default(),
            last_updated: None,
        }
    }
}
