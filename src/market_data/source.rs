use async_trait::async_trait;

use crate::market_data::types::FetchOutcome;

/// Seam between the refresh orchestration and the concrete upstream client,
/// so the staleness/guard logic can be exercised against a stub.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Performs the upstream calls for one refresh cycle. Never fails;
    /// failures are folded into the outcome's per-group status.
    async fn refresh(&self) -> FetchOutcome;
}
