use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::market_data::source::MarketDataSource;
use crate::market_data::types::{BasketAsset, BasketCaps, FetchOutcome, TrackedUpdate, Upstream};
use crate::telemetry;

/// CoinGecko can be slow under load; anything beyond this is treated as a
/// network error and the cache keeps serving.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Upstream client for the three CoinGecko endpoints: the aggregate
/// simple/price query for the basket, the /coins/{id} detail query for the
/// tracked asset, and the coarser simple/price fallback for the same asset.
pub struct CoinGeckoFetcher {
    http: reqwest::Client,
    base_url: String,
    tracked_id: String,
}

impl CoinGeckoFetcher {
    pub fn new(base_url: &str, tracked_id: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(CoinGeckoFetcher {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tracked_id: tracked_id.to_string(),
        })
    }

    fn basket_url(&self) -> String {
        let ids = BasketAsset::ALL.map(|a| a.id()).join(",");
        format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_market_cap=true",
            self.base_url, ids
        )
    }

    fn detail_url(&self) -> String {
        format!(
            "{}/coins/{}?localization=false&tickers=false&community_data=false&developer_data=false",
            self.base_url, self.tracked_id
        )
    }

    fn simple_url(&self) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies=usd&include_market_cap=true&include_24hr_change=true",
            self.base_url, self.tracked_id
        )
    }

    /// One GET, classified. Rate limiting is detected both from an HTTP 429
    /// and from the `status.error_code` CoinGecko puts inside a 200 body.
    async fn get_json(&self, endpoint: &'static str, url: &str) -> Upstream<Value> {
        let start = Instant::now();

        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(err) => {
                warn!(endpoint, error = %err, "upstream request failed");
                telemetry::record_upstream_call(endpoint, "network_error");
                return Upstream::NetworkError;
            }
        };

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(endpoint, "upstream rate limited (HTTP 429)");
            telemetry::record_upstream_call(endpoint, "rate_limited");
            return Upstream::RateLimited;
        }

        let body: Value = match response.json().await {
            Ok(v) => v,
            Err(err) => {
                warn!(endpoint, error = %err, "upstream body unparseable");
                telemetry::record_upstream_call(endpoint, "network_error");
                return Upstream::NetworkError;
            }
        };

        telemetry::record_upstream_latency(endpoint, start.elapsed().as_millis() as f64);

        if body_rate_limited(&body) {
            warn!(endpoint, "upstream rate limited (body status)");
            telemetry::record_upstream_call(endpoint, "rate_limited");
            return Upstream::RateLimited;
        }

        telemetry::record_upstream_call(endpoint, "success");
        Upstream::Success(body)
    }

    async fn fetch_tracked_simple(&self) -> Upstream<TrackedUpdate> {
        match self.get_json("tracked_simple", &self.simple_url()).await {
            Upstream::Success(body) => match parse_tracked_simple(&body, &self.tracked_id) {
                Some(update) => Upstream::Success(update),
                None => {
                    debug!(coin = %self.tracked_id, "simple body had no entry for tracked asset");
                    Upstream::NetworkError
                }
            },
            Upstream::RateLimited => Upstream::RateLimited,
            Upstream::NetworkError => Upstream::NetworkError,
        }
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoFetcher {
    async fn refresh(&self) -> FetchOutcome {
        debug!("fetching fresh data from CoinGecko");

        let basket = match self.get_json("basket", &self.basket_url()).await {
            Upstream::Success(body) => Upstream::Success(parse_basket(&body)),
            Upstream::RateLimited => Upstream::RateLimited,
            Upstream::NetworkError => Upstream::NetworkError,
        };

        let tracked = match self.get_json("tracked_detail", &self.detail_url()).await {
            Upstream::Success(body) => match parse_tracked_detail(&body) {
                Some(update) => Upstream::Success(update),
                // No market_data in the detail body; the coarser endpoint
                // may still know the coin.
                None => self.fetch_tracked_simple().await,
            },
            // Already throttled; a third call would burn quota for nothing.
            Upstream::RateLimited => Upstream::RateLimited,
            Upstream::NetworkError => self.fetch_tracked_simple().await,
        };

        FetchOutcome { basket, tracked }
    }
}

/// CoinGecko signals throttling inside an HTTP 200 body.
fn body_rate_limited(body: &Value) -> bool {
    body["status"]["error_code"].as_i64() == Some(429)
}

/// Present and positive, or nothing. Zero from upstream means "no data".
fn positive(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| *v > 0.0)
}

/// Aggregate simple/price body. A missing per-asset key is "no update for
/// that asset", not zero.
fn parse_basket(body: &Value) -> BasketCaps {
    let mut caps = BasketCaps::new();
    for asset in BasketAsset::ALL {
        if let Some(cap) = positive(&body[asset.id()]["usd_market_cap"]) {
            caps.insert(asset, cap);
        }
    }
    caps
}

/// /coins/{id} detail body. None when the body carries no `market_data`
/// at all, which sends the caller to the fallback endpoint.
fn parse_tracked_detail(body: &Value) -> Option<TrackedUpdate> {
    let market = body.get("market_data")?;
    Some(TrackedUpdate {
        price: positive(&market["current_price"]["usd"]),
        market_cap: positive(&market["market_cap"]["usd"]),
        circulating_supply: positive(&market["circulating_supply"]),
        // Explicit max supply, else total supply, else leave unchanged.
        max_supply: positive(&market["max_supply"])
            .or_else(|| positive(&market["total_supply"])),
        price_change_24h: market["price_change_percentage_24h"].as_f64(),
        supply_is_estimate: false,
    })
}

/// Fallback simple/price body for the tracked asset. Supply is derived as
/// marketCap / price when both are present, and flagged as an estimate.
fn parse_tracked_simple(body: &Value, coin_id: &str) -> Option<TrackedUpdate> {
    let coin = body.get(coin_id)?;
    let price = positive(&coin["usd"]);
    let market_cap = positive(&coin["usd_market_cap"]);
    let circulating = match (market_cap, price) {
        (Some(cap), Some(p)) => Some(cap / p),
        _ => None,
    };
    Some(TrackedUpdate {
        price,
        market_cap,
        circulating_supply: circulating,
        max_supply: None,
        price_change_24h: coin["usd_24h_change"].as_f64(),
        supply_is_estimate: circulating.is_some(),
    })
}
