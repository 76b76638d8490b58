//! Per-session market watch service
//!
//! Wires the snapshot cache, poller, alert evaluator and portfolio valuator
//! for one user session. Sessions are independent; nothing here is global.

use crate::{
    alerts::AlertEvaluator,
    cache::PriceSnapshotCache,
    config::{EngineConfig, ProviderKind},
    error::{EngineError, ProviderError},
    notify::NotificationSink,
    paging,
    poller::MarketPoller,
    portfolio::{PortfolioValuation, PortfolioValuator},
    provider::MarketDataProvider,
    providers::{CoinGeckoProvider, FailoverProvider},
    store::{AlertStore, HoldingStore},
    types::{CoinQuote, ComponentHealth},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Owned page of the cached snapshot, ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardPage {
    pub items: Vec<CoinQuote>,
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
    pub searching: bool,
    /// Capture time of the snapshot the page was cut from, if any
    pub fetched_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

/// Market watch session
///
/// # Example
/// ```no_run
/// use market_watch_engine::{Alert, EngineConfig, Holding, LogSink, MarketWatch, MemoryStore};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let watch = MarketWatch::with_coingecko(
///     EngineConfig::from_env(),
///     Arc::new(MemoryStore::<Alert>::new()),
///     Arc::new(MemoryStore::<Holding>::new()),
///     Arc::new(LogSink::new()),
/// )?;
/// watch.start();
/// watch.poller().refresh_now().await?;
/// let page = watch.dashboard_page("", 1);
/// println!("{} coins on page {}", page.items.len(), page.page);
/// watch.stop();
/// # Ok(())
/// # }
/// ```
pub struct MarketWatch {
    config: EngineConfig,
    cache: Arc<PriceSnapshotCache>,
    poller: MarketPoller,
    evaluator: AlertEvaluator,
    valuator: PortfolioValuator,
    alerts: Arc<AlertStore>,
    holdings: Arc<HoldingStore>,
}

impl MarketWatch {
    /// Creates a stopped session over a custom provider
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn MarketDataProvider>,
        alerts: Arc<AlertStore>,
        holdings: Arc<HoldingStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let cache = Arc::new(PriceSnapshotCache::new());
        let poller = MarketPoller::new(provider, cache.clone(), &config);
        let evaluator = AlertEvaluator::new(
            alerts.clone(),
            poller.detail_lookup(),
            sink,
            cache.clone(),
            config.refresh_interval(),
            config.alert_start_delay(),
        );
        let valuator = PortfolioValuator::new(holdings.clone(), poller.detail_lookup());

        Ok(Self {
            config,
            cache,
            poller,
            evaluator,
            valuator,
            alerts,
            holdings,
        })
    }

    /// Creates a stopped session over the CoinGecko provider chosen by `config`
    pub fn with_coingecko(
        config: EngineConfig,
        alerts: Arc<AlertStore>,
        holdings: Arc<HoldingStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, EngineError> {
        let provider = build_provider(&config).map_err(|e| {
            EngineError::internal(format!("could not build market data provider: {}", e))
        })?;
        Self::new(config, provider, alerts, holdings, sink)
    }

    /// Starts the poller, then the alert evaluator
    ///
    /// Returns false if the session was already running.
    pub fn start(&self) -> bool {
        let poller_started = self.poller.start();
        let evaluator_started = self.evaluator.start();

        if poller_started || evaluator_started {
            tracing::info!(
                provider = self.poller.provider_name(),
                refresh_interval_secs = self.config.refresh_interval_secs,
                alert_start_delay_ms = self.config.alert_start_delay_ms,
                "Market watch started"
            );
        }
        poller_started || evaluator_started
    }

    /// Stops both scheduled tasks; work in progress still completes
    pub fn stop(&self) -> bool {
        let poller_stopped = self.poller.stop();
        let evaluator_stopped = self.evaluator.stop();
        if poller_stopped || evaluator_stopped {
            tracing::info!("Market watch stopped");
        }
        poller_stopped || evaluator_stopped
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_running() || self.evaluator.is_running()
    }

    /// Pages the cached snapshot
    ///
    /// Before the first successful refresh this is an empty page 1.
    pub fn dashboard_page(&self, search: &str, page_number: usize) -> DashboardPage {
        let snapshot = self.cache.get();
        let quotes = snapshot.as_deref().map_or(&[][..], |s| s.quotes());
        let window = paging::page(quotes, search, page_number, self.config.page_size);

        DashboardPage {
            items: window.items.into_iter().cloned().collect(),
            page: window.page,
            total_pages: window.total_pages,
            total_matches: window.total_matches,
            searching: window.searching,
            fetched_at: snapshot.as_ref().map(|s| s.fetched_at()),
            stale: self.cache.is_stale(self.config.stale_threshold_secs),
        }
    }

    /// Values the current holdings at live prices
    pub async fn portfolio(&self) -> Result<PortfolioValuation, EngineError> {
        self.valuator.refresh().await
    }

    pub fn health_check(&self) -> ComponentHealth {
        self.poller.health_check()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<PriceSnapshotCache> {
        &self.cache
    }

    pub fn poller(&self) -> &MarketPoller {
        &self.poller
    }

    pub fn evaluator(&self) -> &AlertEvaluator {
        &self.evaluator
    }

    pub fn valuator(&self) -> &PortfolioValuator {
        &self.valuator
    }

    pub fn alert_store(&self) -> &Arc<AlertStore> {
        &self.alerts
    }

    pub fn holding_store(&self) -> &Arc<HoldingStore> {
        &self.holdings
    }
}

/// Builds the provider selected by `config.provider`
fn build_provider(config: &EngineConfig) -> Result<Arc<dyn MarketDataProvider>, ProviderError> {
    let primary: Arc<dyn MarketDataProvider> = Arc::new(CoinGeckoProvider::from_config(config)?);

    match (config.provider, &config.fallback_api_url) {
        (ProviderKind::Coingecko, _) => Ok(primary),
        (ProviderKind::Failover, Some(fallback_url)) => {
            let secondary = CoinGeckoProvider::new(
                fallback_url.clone(),
                config.request_timeout(),
                config.market_pages,
            )?;
            Ok(Arc::new(FailoverProvider::new(vec![
                primary,
                Arc::new(secondary),
            ])))
        }
        (ProviderKind::Failover, None) => {
            tracing::warn!(
                "Failover provider selected without a fallback URL, using CoinGecko only"
            );
            Ok(primary)
        }
    }
}
