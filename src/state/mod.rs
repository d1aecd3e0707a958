pub mod market_cache;
pub mod snapshot;
