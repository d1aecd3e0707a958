pub mod coingecko;
pub mod refresher;
pub mod source;
pub mod types;
