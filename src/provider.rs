//! Provider abstraction for reading market data from external APIs

use crate::{error::ProviderError, types::CoinQuote};
use async_trait::async_trait;

/// Read-only source of coin quotes
///
/// Implementations have no side effects and may fail or return partial data.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetches every tracked coin in the provider's ranking order
    async fn list_all_quotes(&self) -> Result<Vec<CoinQuote>, ProviderError>;

    /// Fetches the authoritative quote for a single coin
    ///
    /// # Returns
    /// The quote, or `ProviderError::NotFound` if the id is unknown
    async fn get_quote_detail(&self, coin_id: &str) -> Result<CoinQuote, ProviderError>;

    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str;
}
