mod config;
mod market_data;
mod server;
mod state;
mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use config::Config;
use market_data::coingecko::CoinGeckoFetcher;
use market_data::refresher::{RefreshHandle, run_refresh_loop};
use state::market_cache::{self, MarketCache};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing("info");
    telemetry::init_metrics();

    let cfg = Config::from_env()?;
    info!(tracked = %cfg.tracked_id, cache_secs = cfg.cache_secs, "nockcap starting");

    let cache = market_cache::new_handle(MarketCache::new(cfg.gold_market_cap));
    let fetcher = CoinGeckoFetcher::new(&cfg.coingecko_url, &cfg.tracked_id)?;
    let refresh = RefreshHandle::new(Arc::new(fetcher), cache, cfg.cache_ttl());

    let addr = cfg.bind_addr()?;
    let loop_handle = tokio::spawn(run_refresh_loop(refresh.clone(), cfg.refresh_interval()));
    let server_handle = tokio::spawn(server::start_server(addr, refresh));

    tokio::select! {
        res = loop_handle => {
            match res {
                Ok(Ok(())) => warn!("refresh loop exited"),
                Ok(Err(err)) => warn!(error = %err, "refresh loop returned error"),
                Err(err) => warn!(error = %err, "refresh loop task panicked"),
            }
        }
        res = server_handle => {
            match res {
                Ok(Ok(())) => warn!("webserver exited"),
                Ok(Err(err)) => warn!(error = %err, "webserver returned error"),
                Err(err) => warn!(error = %err, "webserver task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
