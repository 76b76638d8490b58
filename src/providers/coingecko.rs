//! CoinGecko market data provider implementation

use crate::{
    config::EngineConfig,
    constants::{
        COINGECKO_COIN_ENDPOINT, COINGECKO_MARKETS_ENDPOINT, COINGECKO_MARKETS_PER_PAGE,
        USER_AGENT,
    },
    error::ProviderError,
    provider::MarketDataProvider,
    types::CoinQuote,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// One row of `/coins/markets`
#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    name: String,
    symbol: String,
    current_price: Option<Decimal>,
    price_change_percentage_24h: Option<Decimal>,
    market_cap: Option<Decimal>,
    #[serde(default)]
    image: Option<String>,
}

/// `/coins/{id}` response, reduced to the fields we read
#[derive(Debug, Deserialize)]
struct CoinDetailResponse {
    id: String,
    name: String,
    symbol: String,
    #[serde(default)]
    image: Option<DetailImage>,
    #[serde(default)]
    market_data: Option<DetailMarketData>,
}

#[derive(Debug, Deserialize)]
struct DetailImage {
    #[serde(default)]
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailMarketData {
    #[serde(default)]
    current_price: HashMap<String, Option<Decimal>>,
    #[serde(default)]
    market_cap: HashMap<String, Option<Decimal>>,
    #[serde(default)]
    price_change_percentage_24h: Option<Decimal>,
}

/// CoinGecko provider
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    market_pages: u32,
}

impl CoinGeckoProvider {
    /// Creates a new CoinGecko provider
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        market_pages: u32,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::NetworkError)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            market_pages: market_pages.max(1),
        })
    }

    /// Creates a provider from engine settings
    pub fn from_config(config: &EngineConfig) -> Result<Self, ProviderError> {
        Self::new(
            config.coingecko_api_url.clone(),
            config.request_timeout(),
            config.market_pages,
        )
    }

    fn markets_url(&self) -> String {
        format!("{}{}", self.base_url, COINGECKO_MARKETS_ENDPOINT)
    }

    fn detail_url(&self, coin_id: &str) -> String {
        format!("{}{}/{}", self.base_url, COINGECKO_COIN_ENDPOINT, coin_id)
    }

    async fn fetch_market_page(&self, page: u32) -> Result<Vec<CoinQuote>, ProviderError> {
        let url = self.markets_url();
        tracing::debug!(url = %url, page, "Fetching market page from CoinGecko");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("vs_currency", "usd".to_string()),
                ("order", "market_cap_desc".to_string()),
                ("per_page", COINGECKO_MARKETS_PER_PAGE.to_string()),
                ("page", page.to_string()),
                ("sparkline", "false".to_string()),
            ])
            .send()
            .await
            .map_err(map_request_error)?;

        let text = read_body(response, None).await?;
        parse_markets(&text)
    }
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    async fn list_all_quotes(&self) -> Result<Vec<CoinQuote>, ProviderError> {
        let mut quotes = Vec::new();

        for page in 1..=self.market_pages {
            let batch = self.fetch_market_page(page).await?;
            let short_page = batch.len() < COINGECKO_MARKETS_PER_PAGE as usize;
            quotes.extend(batch);
            if short_page {
                break;
            }
        }

        if quotes.is_empty() {
            return Err(ProviderError::EmptyResponse(
                "No coins returned from CoinGecko".to_string(),
            ));
        }

        tracing::debug!(count = quotes.len(), "Fetched market list from CoinGecko");
        Ok(quotes)
    }

    async fn get_quote_detail(&self, coin_id: &str) -> Result<CoinQuote, ProviderError> {
        if !is_valid_coin_id(coin_id) {
            return Err(ProviderError::NotFound(coin_id.to_string()));
        }

        let url = self.detail_url(coin_id);
        tracing::debug!(url = %url, "Fetching coin detail from CoinGecko");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("localization", "false"),
                ("tickers", "false"),
                ("community_data", "false"),
                ("developer_data", "false"),
            ])
            .send()
            .await
            .map_err(map_request_error)?;

        let text = read_body(response, Some(coin_id)).await?;
        parse_detail(&text, coin_id)
    }

    fn provider_name(&self) -> &'static str {
        "coingecko"
    }
}

fn is_valid_coin_id(coin_id: &str) -> bool {
    !coin_id.is_empty()
        && coin_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn map_request_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::NetworkError(err)
    }
}

/// Maps the HTTP status onto provider errors and returns the body
async fn read_body(response: Response, coin_id: Option<&str>) -> Result<String, ProviderError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimitExceeded);
    }

    if status == StatusCode::NOT_FOUND {
        if let Some(coin_id) = coin_id {
            return Err(ProviderError::NotFound(coin_id.to_string()));
        }
    }

    if !status.is_success() {
        return Err(ProviderError::ApiError(format!(
            "HTTP {}: {}",
            status,
            response.text().await.unwrap_or_default()
        )));
    }

    response.text().await.map_err(map_request_error)
}

fn parse_markets(text: &str) -> Result<Vec<CoinQuote>, ProviderError> {
    let entries: Vec<MarketEntry> = serde_json::from_str(text).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse CoinGecko markets: {}", e))
    })?;

    let quotes = entries
        .into_iter()
        .filter_map(|entry| {
            let Some(price) = entry.current_price else {
                tracing::debug!(coin_id = %entry.id, "Skipping coin without a price");
                return None;
            };
            Some(CoinQuote {
                id: entry.id,
                name: entry.name,
                symbol: entry.symbol,
                current_price: price,
                price_change_percentage_24h: entry
                    .price_change_percentage_24h
                    .unwrap_or(Decimal::ZERO),
                market_cap: entry.market_cap.unwrap_or(Decimal::ZERO),
                image: entry.image.unwrap_or_default(),
            })
        })
        .collect();

    Ok(quotes)
}

fn parse_detail(text: &str, coin_id: &str) -> Result<CoinQuote, ProviderError> {
    let detail: CoinDetailResponse = serde_json::from_str(text).map_err(|e| {
        ProviderError::InvalidResponse(format!(
            "Failed to parse CoinGecko detail for {}: {}",
            coin_id, e
        ))
    })?;

    let market_data = detail
        .market_data
        .ok_or_else(|| ProviderError::NotFound(coin_id.to_string()))?;

    let price = market_data
        .current_price
        .get("usd")
        .copied()
        .flatten()
        .ok_or_else(|| ProviderError::NotFound(coin_id.to_string()))?;

    Ok(CoinQuote {
        id: detail.id,
        name: detail.name,
        symbol: detail.symbol,
        current_price: price,
        price_change_percentage_24h: market_data
            .price_change_percentage_24h
            .unwrap_or(Decimal::ZERO),
        market_cap: market_data
            .market_cap
            .get("usd")
            .copied()
            .flatten()
            .unwrap_or(Decimal::ZERO),
        image: detail.image.and_then(|i| i.large).unwrap_or_default(),
    })
}
