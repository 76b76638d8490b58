//! Runtime configuration for the market watch engine

use crate::{constants::*, error::EngineError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provider choice for `MarketWatch::with_coingecko`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// CoinGecko only
    Coingecko,
    /// CoinGecko, then a second CoinGecko client on the fallback URL
    Failover,
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub refresh_interval_secs: u64,
    pub alert_start_delay_ms: u64,
    pub stale_threshold_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retry_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub page_size: usize,
    pub coingecko_api_url: String,
    /// Secondary base URL used by the failover provider
    pub fallback_api_url: Option<String>,
    pub market_pages: u32,
    pub provider: ProviderKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: REFRESH_INTERVAL_SECS,
            alert_start_delay_ms: ALERT_START_DELAY_MS,
            stale_threshold_secs: STALE_THRESHOLD_SECS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            max_retry_attempts: MAX_RETRY_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            page_size: DEFAULT_PAGE_SIZE,
            coingecko_api_url: COINGECKO_API_URL.to_string(),
            fallback_api_url: None,
            market_pages: DEFAULT_MARKET_PAGES,
            provider: ProviderKind::Coingecko,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `MARKET_WATCH_*` environment variables
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        override_parsed(
            &lookup,
            "MARKET_WATCH_REFRESH_INTERVAL_SECS",
            &mut config.refresh_interval_secs,
        );
        override_parsed(
            &lookup,
            "MARKET_WATCH_ALERT_START_DELAY_MS",
            &mut config.alert_start_delay_ms,
        );
        override_parsed(
            &lookup,
            "MARKET_WATCH_STALE_THRESHOLD_SECS",
            &mut config.stale_threshold_secs,
        );
        override_parsed(
            &lookup,
            "MARKET_WATCH_REQUEST_TIMEOUT_SECS",
            &mut config.request_timeout_secs,
        );
        override_parsed(&lookup, "MARKET_WATCH_MAX_RETRY_ATTEMPTS", &mut config.max_retry_attempts);
        override_parsed(&lookup, "MARKET_WATCH_PAGE_SIZE", &mut config.page_size);
        override_parsed(&lookup, "MARKET_WATCH_MARKET_PAGES", &mut config.market_pages);

        if let Some(url) = lookup("MARKET_WATCH_COINGECKO_API_URL") {
            config.coingecko_api_url = url;
        }
        if let Some(url) = lookup("MARKET_WATCH_FALLBACK_API_URL") {
            config.fallback_api_url = Some(url);
        }
        if let Some(provider) = lookup("MARKET_WATCH_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "coingecko" => config.provider = ProviderKind::Coingecko,
                "failover" => config.provider = ProviderKind::Failover,
                other => tracing::warn!(provider = other, "Unknown provider, keeping default"),
            }
        }

        config
    }

    /// Rejects settings the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.refresh_interval_secs == 0 {
            return Err(EngineError::invalid("refresh interval must be at least 1 second"));
        }
        if self.request_timeout_secs == 0 {
            return Err(EngineError::invalid("request timeout must be at least 1 second"));
        }
        if self.max_retry_attempts == 0 {
            return Err(EngineError::invalid("at least one refresh attempt is required"));
        }
        if self.page_size == 0 {
            return Err(EngineError::invalid("page size must be at least 1"));
        }
        if self.market_pages == 0 {
            return Err(EngineError::invalid("at least one market page is required"));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn alert_start_delay(&self) -> Duration {
        Duration::from_millis(self.alert_start_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparseable setting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.alert_start_delay(), Duration::from_millis(2000));
        assert_eq!(config.page_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("MARKET_WATCH_REFRESH_INTERVAL_SECS", "15"),
            ("MARKET_WATCH_PAGE_SIZE", "25"),
            ("MARKET_WATCH_PROVIDER", "Failover"),
            ("MARKET_WATCH_FALLBACK_API_URL", "https://mirror.example/api/v3"),
        ]));

        assert_eq!(config.refresh_interval_secs, 15);
        assert_eq!(config.page_size, 25);
        assert_eq!(config.provider, ProviderKind::Failover);
        assert_eq!(
            config.fallback_api_url.as_deref(),
            Some("https://mirror.example/api/v3")
        );
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("MARKET_WATCH_REFRESH_INTERVAL_SECS", "soon"),
            ("MARKET_WATCH_PROVIDER", "binance"),
        ]));

        assert_eq!(config.refresh_interval_secs, REFRESH_INTERVAL_SECS);
        assert_eq!(config.provider, ProviderKind::Coingecko);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = EngineConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::InvalidInput(_))));
    }
}
