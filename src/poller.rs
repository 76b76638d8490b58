//! Market snapshot poller
//!
//! Refreshes the shared `PriceSnapshotCache` on a fixed interval and on demand.

use crate::{
    cache::PriceSnapshotCache,
    config::EngineConfig,
    error::{EngineError, ProviderError},
    lookup::{DetailLookup, DetailResult},
    metrics::{Endpoint, FetchMetrics, MetricsCollector},
    provider::MarketDataProvider,
    schedule::{PeriodicTask, Schedule, SingleFlight},
    types::{ComponentHealth, HealthStatus, MarketEvent, MarketSnapshot},
};
use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::sleep;
use uuid::Uuid;

/// Result of one refresh, shared by every coalesced caller
pub type RefreshOutcome = Result<Arc<MarketSnapshot>, EngineError>;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Retry settings for a single refresh
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

struct PollerState {
    cache: Arc<PriceSnapshotCache>,
    provider: Arc<dyn MarketDataProvider>,
    metrics: Arc<MetricsCollector>,
    last_error: RwLock<Option<EngineError>>,
    events: broadcast::Sender<MarketEvent>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl PollerState {
    /// Fetches a snapshot with retry on transient errors and commits it
    async fn fetch_and_commit(&self) -> RefreshOutcome {
        let mut backoff = self.retry.initial_backoff;
        let started = Instant::now();

        for attempt in 1..=self.retry.max_attempts {
            let attempt_started = Instant::now();
            let result = match tokio::time::timeout(
                self.request_timeout,
                self.provider.list_all_quotes(),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };
            self.metrics
                .record(Endpoint::Snapshot, attempt_started.elapsed(), result.is_ok());

            let error = match result {
                Ok(quotes) => {
                    let snapshot = MarketSnapshot::new(quotes, self.provider.provider_name());
                    if snapshot.is_empty() {
                        EngineError::DataUnavailable("provider returned no coins".to_string())
                    } else {
                        tracing::debug!(
                            count = snapshot.len(),
                            provider = self.provider.provider_name(),
                            latency_ms = started.elapsed().as_millis() as u64,
                            "Successfully fetched market snapshot"
                        );
                        return Ok(self.commit(snapshot));
                    }
                }
                Err(e) => EngineError::from(e),
            };

            if error.is_transient() && attempt < self.retry.max_attempts {
                tracing::warn!(
                    attempt,
                    max_attempts = self.retry.max_attempts,
                    error = %error,
                    "Failed to fetch market snapshot, retrying"
                );
                sleep(backoff).await;
                backoff = (backoff * 2).min(self.retry.max_backoff);
                continue;
            }

            return Err(self.fail(error));
        }

        Err(self.fail(EngineError::internal("no refresh attempts configured")))
    }

    fn commit(&self, snapshot: MarketSnapshot) -> Arc<MarketSnapshot> {
        let snapshot = self.cache.set(snapshot);
        *self
            .last_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;

        let _ = self.events.send(MarketEvent::SnapshotRefreshed {
            id: Uuid::new_v4(),
            coins: snapshot.len(),
            source: snapshot.source().to_string(),
            timestamp: Utc::now(),
        });
        snapshot
    }

    /// Records a failed refresh; the cached snapshot is left untouched
    fn fail(&self, error: EngineError) -> EngineError {
        tracing::warn!(
            error = %error,
            keeping_snapshot = self.cache.has_data(),
            "Market snapshot refresh failed"
        );
        *self
            .last_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(error.clone());

        let _ = self.events.send(MarketEvent::RefreshFailed {
            id: Uuid::new_v4(),
            error_message: error.to_string(),
            transient: error.is_transient(),
            timestamp: Utc::now(),
        });
        error
    }
}

/// Periodic market snapshot refresher
///
/// # Example
/// ```no_run
/// use market_watch_engine::{EngineConfig, MarketPoller, PriceSnapshotCache};
/// use market_watch_engine::providers::CoinGeckoProvider;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = EngineConfig::default();
/// let cache = Arc::new(PriceSnapshotCache::new());
/// let provider = Arc::new(CoinGeckoProvider::from_config(&config)?);
/// let poller = MarketPoller::new(provider, cache.clone(), &config);
///
/// poller.start();
/// let snapshot = poller.refresh_now().await?;
/// println!("{} coins from {}", snapshot.len(), snapshot.source());
/// poller.stop();
/// # Ok(())
/// # }
/// ```
pub struct MarketPoller {
    state: Arc<PollerState>,
    flight: Arc<SingleFlight<RefreshOutcome>>,
    details: DetailLookup,
    task: PeriodicTask,
    interval: Duration,
    stale_threshold_secs: u64,
}

impl MarketPoller {
    /// Creates a stopped poller writing into `cache`
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        cache: Arc<PriceSnapshotCache>,
        config: &EngineConfig,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new(provider.provider_name()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let details = DetailLookup::new(
            provider.clone(),
            metrics.clone(),
            config.request_timeout(),
        );

        let state = Arc::new(PollerState {
            cache,
            provider,
            metrics,
            last_error: RwLock::new(None),
            events,
            retry: RetryPolicy {
                max_attempts: config.max_retry_attempts.max(1),
                initial_backoff: Duration::from_millis(config.initial_backoff_ms),
                max_backoff: Duration::from_millis(config.max_backoff_ms),
            },
            request_timeout: config.request_timeout(),
        });

        Self {
            state,
            flight: Arc::new(SingleFlight::new()),
            details,
            task: PeriodicTask::new("market_poller"),
            interval: config.refresh_interval(),
            stale_threshold_secs: config.stale_threshold_secs,
        }
    }

    /// Refreshes immediately, then every refresh interval until `stop()`
    ///
    /// Returns false if the poller is already running.
    pub fn start(&self) -> bool {
        let state = self.state.clone();
        let flight = self.flight.clone();

        self.task.start(
            Schedule::every(self.interval),
            std::future::ready(()),
            move || {
                let state = state.clone();
                let flight = flight.clone();
                async move {
                    // Failures are recorded in `last_error` and published.
                    let _ = Self::coalesced_refresh(&state, &flight).await;
                }
            },
        )
    }

    /// Stops scheduling refreshes; a refresh in progress still commits
    pub fn stop(&self) -> bool {
        self.task.stop()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Refreshes now, or joins the refresh already in progress
    pub async fn refresh_now(&self) -> RefreshOutcome {
        Self::coalesced_refresh(&self.state, &self.flight).await
    }

    async fn coalesced_refresh(
        state: &Arc<PollerState>,
        flight: &SingleFlight<RefreshOutcome>,
    ) -> RefreshOutcome {
        flight
            .run(|| {
                let state = state.clone();
                async move {
                    // Spawned so that dropping every caller cannot cut a commit short.
                    tokio::spawn(async move { state.fetch_and_commit().await })
                        .await
                        .unwrap_or_else(|e| {
                            Err(EngineError::internal(format!("refresh task failed: {}", e)))
                        })
                }
            })
            .await
    }

    /// Fetches one coin's detail straight from the provider
    pub async fn get_coin_details(&self, coin_id: &str) -> DetailResult {
        self.details.fetch(coin_id).await
    }

    /// Detail lookup handle sharing this poller's provider and metrics
    pub fn detail_lookup(&self) -> DetailLookup {
        self.details.clone()
    }

    pub fn cache(&self) -> &Arc<PriceSnapshotCache> {
        &self.state.cache
    }

    /// Error from the most recent refresh, cleared by the next success
    pub fn last_error(&self) -> Option<EngineError> {
        self.state
            .last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receiver for refresh events
    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.state.events.subscribe()
    }

    /// Returns the name of the current provider
    pub fn provider_name(&self) -> &'static str {
        self.state.provider.provider_name()
    }

    /// Latency percentiles and success rates of provider calls
    pub fn metrics(&self) -> FetchMetrics {
        self.state.metrics.get_metrics()
    }

    /// Perform a health check on the poller
    pub fn health_check(&self) -> ComponentHealth {
        let mut details = std::collections::HashMap::new();
        let snapshot = self.state.cache.get();
        let last_error = self.last_error();
        let stale = self.state.cache.is_stale(self.stale_threshold_secs);

        details.insert(
            "coins".to_string(),
            serde_json::json!(snapshot.as_ref().map_or(0, |s| s.len())),
        );
        details.insert(
            "provider_name".to_string(),
            serde_json::json!(self.provider_name()),
        );
        details.insert(
            "snapshot_age_secs".to_string(),
            serde_json::json!(snapshot.as_ref().map(|s| s.age().as_secs())),
        );
        details.insert("running".to_string(), serde_json::json!(self.is_running()));
        if let Some(error) = &last_error {
            details.insert(
                "last_error".to_string(),
                serde_json::json!(error.to_string()),
            );
        }

        let (status, message) = match (&snapshot, &last_error) {
            (None, _) => (
                HealthStatus::Unhealthy,
                "Market poller has no snapshot yet".to_string(),
            ),
            (Some(_), Some(error)) => (
                HealthStatus::Degraded,
                format!("Serving previous snapshot after failed refresh: {}", error),
            ),
            (Some(s), None) if stale => (
                HealthStatus::Degraded,
                format!("Snapshot is stale (age: {:?})", s.age()),
            ),
            (Some(_), None) => (
                HealthStatus::Healthy,
                "Market poller is operational with fresh data".to_string(),
            ),
        };

        ComponentHealth {
            name: "market_poller".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: Utc::now(),
        }
    }
}
