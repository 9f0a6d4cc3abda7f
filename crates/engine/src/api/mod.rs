//! Upstream market-data collaborators

pub mod yahoo;

use async_trait::async_trait;

use crate::error::AnalyticsResult;

pub use yahoo::YahooQuoteClient;

/// Source of the current underlying price for a symbol.
///
/// Failures surface as [`crate::AnalyticsError::UpstreamUnavailable`]; callers
/// decide how to degrade (see [`crate::chain::resolve_spot`]).
#[async_trait]
pub trait SpotPriceSource: Send + Sync {
    async fn spot_price(&self, symbol: &str) -> AnalyticsResult<f64>;
}
