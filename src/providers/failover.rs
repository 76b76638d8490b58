//! Failover market data provider implementation

use crate::{error::ProviderError, provider::MarketDataProvider, types::CoinQuote};
use async_trait::async_trait;
use std::sync::Arc;

/// Provider that asks a list of providers in order until one succeeds
pub struct FailoverProvider {
    providers: Vec<Arc<dyn MarketDataProvider>>,
}

impl FailoverProvider {
    /// Creates a new failover provider
    ///
    /// The providers are tried in the order they are given.
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>) -> Self {
        Self { providers }
    }

    fn no_providers() -> ProviderError {
        ProviderError::InvalidResponse("No providers configured for failover".to_string())
    }
}

/// Failures seen while walking the provider list
///
/// A transient failure outranks a permanent one, so a coin one provider does
/// not list is not reported as missing while another provider was unreachable.
#[derive(Default)]
struct Failures {
    transient: Option<ProviderError>,
    last: Option<ProviderError>,
}

impl Failures {
    fn record(&mut self, error: ProviderError) {
        if error.is_transient() {
            self.transient = Some(error);
        } else {
            self.last = Some(error);
        }
    }

    fn into_error(self) -> ProviderError {
        self.transient
            .or(self.last)
            .unwrap_or_else(FailoverProvider::no_providers)
    }
}

#[async_trait]
impl MarketDataProvider for FailoverProvider {
    async fn list_all_quotes(&self) -> Result<Vec<CoinQuote>, ProviderError> {
        let mut failures = Failures::default();

        for provider in &self.providers {
            match provider.list_all_quotes().await {
                Ok(quotes) => return Ok(quotes),
                Err(e) => {
                    tracing::warn!(
                        provider = provider.provider_name(),
                        error = %e,
                        "Provider failed to list quotes"
                    );
                    failures.record(e);
                }
            }
        }

        Err(failures.into_error())
    }

    async fn get_quote_detail(&self, coin_id: &str) -> Result<CoinQuote, ProviderError> {
        let mut failures = Failures::default();

        for provider in &self.providers {
            match provider.get_quote_detail(coin_id).await {
                Ok(quote) => return Ok(quote),
                Err(e) => {
                    tracing::warn!(
                        provider = provider.provider_name(),
                        coin_id,
                        error = %e,
                        "Provider failed to fetch coin detail"
                    );
                    failures.record(e);
                }
            }
        }

        Err(failures.into_error())
    }

    fn provider_name(&self) -> &'static str {
        "failover"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::{MockFailure, MockProvider};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_falls_through_to_backup() {
        let primary = Arc::new(MockProvider::new());
        primary.fail_next_snapshot(MockFailure::Timeout);
        primary.set_detail_error("bitcoin", MockFailure::RateLimited);

        let backup = Arc::new(MockProvider::new());
        backup.set_quotes(vec![CoinQuote::new("bitcoin", "Bitcoin", "btc", dec!(64000))]);

        let failover = FailoverProvider::new(vec![primary.clone(), backup.clone()]);

        let quotes = failover.list_all_quotes().await.unwrap();
        assert_eq!(quotes.len(), 1);

        let detail = failover.get_quote_detail("bitcoin").await.unwrap();
        assert_eq!(detail.current_price, dec!(64000));
        assert_eq!(primary.detail_calls(), 1);
        assert_eq!(backup.detail_calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_error_reported_after_not_found() {
        let first = Arc::new(MockProvider::new());
        let second = Arc::new(MockProvider::new());
        second.set_detail_error("dogecoin", MockFailure::Timeout);

        let failover = FailoverProvider::new(vec![first, second]);
        let err = failover.get_quote_detail("dogecoin").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
    }

    #[tokio::test]
    async fn test_transient_error_reported_before_not_found() {
        let primary = Arc::new(MockProvider::new());
        primary.set_detail_error("dogecoin", MockFailure::Timeout);
        let backup = Arc::new(MockProvider::new());

        let failover = FailoverProvider::new(vec![primary, backup.clone()]);
        let err = failover.get_quote_detail("dogecoin").await.unwrap_err();

        assert!(matches!(err, ProviderError::Timeout));
        assert_eq!(backup.detail_calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_everywhere_stays_not_found() {
        let first = Arc::new(MockProvider::new());
        let second = Arc::new(MockProvider::new());

        let failover = FailoverProvider::new(vec![first, second]);
        let err = failover.get_quote_detail("dogecoin").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_provider_list() {
        let failover = FailoverProvider::new(Vec::new());
        assert!(failover.list_all_quotes().await.is_err());
    }
}
