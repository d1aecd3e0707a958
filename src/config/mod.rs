use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Staleness window: how long a snapshot is served before a refresh is
    /// attempted. 300 s by default to respect upstream rate limits.
    pub cache_secs: u64,
    /// Period of the background refresh timer.
    pub refresh_secs: u64,
    pub coingecko_url: String,
    /// CoinGecko coin id of the tracked asset.
    pub tracked_id: String,
    /// Gold market cap in USD; static configuration, never fetched.
    pub gold_market_cap: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();

        Ok(Config {
            host: env_or("NOCKCAP_HOST", "127.0.0.1"),
            port: env_parsed("NOCKCAP_PORT", 8080)?,
            cache_secs: env_parsed("NOCKCAP_CACHE_SECS", 300)?,
            refresh_secs: env_parsed("NOCKCAP_REFRESH_SECS", 300)?,
            coingecko_url: env_or("NOCKCAP_COINGECKO_URL", "https://api.coingecko.com/api/v3"),
            tracked_id: env_or("NOCKCAP_TRACKED_ID", "nockchain"),
            gold_market_cap: env_parsed("NOCKCAP_GOLD_MARKET_CAP", 15_800_000_000_000.0)?,
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid {key}: {err}")),
        Err(_) => Ok(default),
    }
}
