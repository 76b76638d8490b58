//! Per-coin detail lookups with a per-request timeout

use crate::{
    error::{EngineError, ProviderError},
    metrics::{Endpoint, MetricsCollector},
    provider::MarketDataProvider,
    types::CoinQuote,
};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one detail lookup
pub type DetailResult = Result<CoinQuote, EngineError>;

/// Issues detail requests against the provider
///
/// Nothing is cached: every call goes to the provider. Callers that need the
/// same coin twice within one pass should use `fetch_many`, which asks once
/// per distinct id.
#[derive(Clone)]
pub struct DetailLookup {
    provider: Arc<dyn MarketDataProvider>,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
}

impl DetailLookup {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        metrics: Arc<MetricsCollector>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            metrics,
            timeout,
        }
    }

    /// Fetches one coin, aborting after the request timeout
    pub async fn fetch(&self, coin_id: &str) -> DetailResult {
        let started = Instant::now();
        let request = self.provider.get_quote_detail(coin_id);
        let result = match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };

        self.metrics
            .record(Endpoint::Detail, started.elapsed(), result.is_ok());

        result.map_err(|e| {
            tracing::debug!(coin_id, error = %e, "Coin detail lookup failed");
            EngineError::from(e)
        })
    }

    /// Fetches several coins concurrently, one request per distinct id
    pub async fn fetch_many<'a, I>(&self, coin_ids: I) -> HashMap<String, DetailResult>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = coin_ids.into_iter().collect();

        let lookups = distinct.into_iter().map(|coin_id| async move {
            (coin_id.to_string(), self.fetch(coin_id).await)
        });

        join_all(lookups).await.into_iter().collect()
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }
}
