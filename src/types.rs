//! Types for the market watch engine

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One coin as quoted by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinQuote {
    /// Stable provider id (e.g. "bitcoin")
    pub id: String,

    /// Display name
    pub name: String,

    /// Ticker symbol
    pub symbol: String,

    /// Price in USD
    pub current_price: Decimal,

    /// 24h price change percentage
    pub price_change_percentage_24h: Decimal,

    /// Market capitalization in USD
    pub market_cap: Decimal,

    /// Image reference
    pub image: String,
}

impl CoinQuote {
    /// Create a quote with zero change and market cap
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        symbol: impl Into<String>,
        current_price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            symbol: symbol.into(),
            current_price,
            price_change_percentage_24h: Decimal::ZERO,
            market_cap: Decimal::ZERO,
            image: String::new(),
        }
    }
}

/// A complete point-in-time set of quotes in provider ranking order
///
/// Coin ids are unique within a snapshot. When the provider repeats an id the
/// first (highest ranked) entry wins.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    quotes: Vec<CoinQuote>,
    index: HashMap<String, usize>,
    fetched_at: DateTime<Utc>,
    source: String,
}

impl MarketSnapshot {
    /// Create a snapshot captured now
    pub fn new(quotes: Vec<CoinQuote>, source: impl Into<String>) -> Self {
        Self::captured_at(quotes, source, Utc::now())
    }

    /// Create a snapshot with an explicit capture time
    pub fn captured_at(
        quotes: Vec<CoinQuote>,
        source: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let mut index = HashMap::with_capacity(quotes.len());
        let mut unique = Vec::with_capacity(quotes.len());

        for quote in quotes {
            if index.contains_key(&quote.id) {
                tracing::debug!(coin_id = %quote.id, "Dropping duplicate coin in snapshot");
                continue;
            }
            index.insert(quote.id.clone(), unique.len());
            unique.push(quote);
        }

        Self {
            quotes: unique,
            index,
            fetched_at,
            source: source.into(),
        }
    }

    /// Quotes in ranking order
    pub fn quotes(&self) -> &[CoinQuote] {
        &self.quotes
    }

    /// Look up a coin by id
    pub fn get(&self, coin_id: &str) -> Option<&CoinQuote> {
        self.index.get(coin_id).map(|&i| &self.quotes[i])
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// When the snapshot was fetched
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Provider that produced the snapshot
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Age of the snapshot
    pub fn age(&self) -> std::time::Duration {
        let duration = Utc::now().signed_duration_since(self.fetched_at);
        std::time::Duration::from_secs(duration.num_seconds().max(0) as u64)
    }

    /// Check if the snapshot is older than `threshold_seconds`
    pub fn is_stale(&self, threshold_seconds: u64) -> bool {
        let age = Utc::now().signed_duration_since(self.fetched_at);
        age.num_seconds() > threshold_seconds as i64
    }
}

/// Direction of a price alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
}

impl AlertCondition {
    /// True when `price` satisfies the condition against `target`
    ///
    /// Both directions are inclusive: a price equal to the target triggers.
    pub fn is_met(&self, price: Decimal, target: Decimal) -> bool {
        match self {
            AlertCondition::Above => price >= target,
            AlertCondition::Below => price <= target,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCondition::Above => "above",
            AlertCondition::Below => "below",
        }
    }
}

impl std::fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A one-shot price alert
///
/// `coin_name` and `symbol` are copied from the catalog when the alert is
/// created and are not refreshed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub coin_id: String,
    pub coin_name: String,
    pub symbol: String,
    pub target_price: Decimal,
    pub condition: AlertCondition,
    pub is_active: bool,
    pub owner: String,
}

/// Creation payload for an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub coin_id: String,
    pub coin_name: String,
    pub symbol: String,
    pub target_price: Decimal,
    pub condition: AlertCondition,
    pub is_active: bool,
    pub owner: String,
}

impl NewAlert {
    /// Build an active alert for a catalog coin, copying its display fields
    pub fn for_quote(
        quote: &CoinQuote,
        target_price: Decimal,
        condition: AlertCondition,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            coin_id: quote.id.clone(),
            coin_name: quote.name.clone(),
            symbol: quote.symbol.to_uppercase(),
            target_price,
            condition,
            is_active: true,
            owner: owner.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.coin_id.trim().is_empty() {
            return Err("alert requires a coin id".to_string());
        }
        validate_target_price(self.target_price)
    }
}

/// Partial update of an alert; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<AlertCondition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl AlertPatch {
    /// The patch the evaluator writes after a trigger
    pub fn deactivate() -> Self {
        Self {
            is_active: Some(false),
            ..Default::default()
        }
    }

    /// Re-arm an inactive alert
    pub fn reactivate() -> Self {
        Self {
            is_active: Some(true),
            ..Default::default()
        }
    }

    /// Point the alert at another catalog coin, copying its display fields
    pub fn repoint(quote: &CoinQuote) -> Self {
        Self {
            coin_id: Some(quote.id.clone()),
            coin_name: Some(quote.name.clone()),
            symbol: Some(quote.symbol.to_uppercase()),
            ..Default::default()
        }
    }
}

pub(crate) fn validate_coin_id(coin_id: &str) -> Result<(), String> {
    if coin_id.trim().is_empty() {
        return Err("coin id must not be empty".to_string());
    }
    Ok(())
}

pub(crate) fn validate_target_price(target: Decimal) -> Result<(), String> {
    if target <= Decimal::ZERO {
        return Err(format!("target price must be positive, got {}", target));
    }
    Ok(())
}

/// A held position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: String,
    pub coin_id: String,
    pub coin_name: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub purchase_price: Decimal,
    pub purchase_date: NaiveDate,
}

/// Creation payload for a holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHolding {
    pub coin_id: String,
    pub coin_name: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub purchase_price: Decimal,
    pub purchase_date: NaiveDate,
}

impl NewHolding {
    /// Build a holding for a catalog coin, copying its display fields
    pub fn for_quote(
        quote: &CoinQuote,
        quantity: Decimal,
        purchase_price: Decimal,
        purchase_date: NaiveDate,
    ) -> Self {
        Self {
            coin_id: quote.id.clone(),
            coin_name: quote.name.clone(),
            symbol: quote.symbol.to_uppercase(),
            quantity,
            purchase_price,
            purchase_date,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.coin_id.trim().is_empty() {
            return Err("holding requires a coin id".to_string());
        }
        validate_position(self.quantity, self.purchase_price)
    }
}

/// Partial update of a holding; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<NaiveDate>,
}

impl HoldingPatch {
    /// Move the holding to another catalog coin, copying its display fields
    pub fn repoint(quote: &CoinQuote) -> Self {
        Self {
            coin_id: Some(quote.id.clone()),
            coin_name: Some(quote.name.clone()),
            symbol: Some(quote.symbol.to_uppercase()),
            ..Default::default()
        }
    }
}

pub(crate) fn validate_position(quantity: Decimal, purchase_price: Decimal) -> Result<(), String> {
    if quantity <= Decimal::ZERO {
        return Err(format!("quantity must be positive, got {}", quantity));
    }
    if purchase_price < Decimal::ZERO {
        return Err(format!(
            "purchase price must not be negative, got {}",
            purchase_price
        ));
    }
    Ok(())
}

/// Emitted once when an alert's condition first holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: Uuid,
    pub alert_id: String,
    pub coin_id: String,
    pub coin_name: String,
    pub symbol: String,
    pub price: Decimal,
    pub condition: AlertCondition,
    pub target_price: Decimal,
    pub triggered_at: DateTime<Utc>,
}

impl TriggerEvent {
    /// Create an event for `alert` evaluated at `price`
    pub fn new(alert: &Alert, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_id: alert.id.clone(),
            coin_id: alert.coin_id.clone(),
            coin_name: alert.coin_name.clone(),
            symbol: alert.symbol.clone(),
            price,
            condition: alert.condition,
            target_price: alert.target_price,
            triggered_at: Utc::now(),
        }
    }

    /// User-facing notice text
    pub fn message(&self) -> String {
        format!(
            "{} ({}) is now ${:.2} ({} ${})",
            self.coin_name, self.symbol, self.price, self.condition, self.target_price
        )
    }
}

/// Market data events published by the poller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketEvent {
    /// A new snapshot replaced the cached one
    SnapshotRefreshed {
        id: Uuid,
        coins: usize,
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// A refresh failed and the previous snapshot was kept
    RefreshFailed {
        id: Uuid,
        error_message: String,
        transient: bool,
        timestamp: DateTime<Utc>,
    },
}

impl MarketEvent {
    /// Get the event ID
    pub fn id(&self) -> Uuid {
        match self {
            MarketEvent::SnapshotRefreshed { id, .. } => *id,
            MarketEvent::RefreshFailed { id, .. } => *id,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &'static str {
        match self {
            MarketEvent::SnapshotRefreshed { .. } => "SNAPSHOT_REFRESHED",
            MarketEvent::RefreshFailed { .. } => "REFRESH_FAILED",
        }
    }
}

impl std::fmt::Display for MarketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketEvent::SnapshotRefreshed { coins, source, .. } => {
                write!(f, "Snapshot refreshed: {} coins from {}", coins, source)
            }
            MarketEvent::RefreshFailed { error_message, .. } => {
                write!(f, "Snapshot refresh failed: {}", error_message)
            }
        }
    }
}

/// Overall component health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fresh data and no outstanding error
    Healthy,
    /// Data is stale or the last refresh failed
    Degraded,
    /// No data at all
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_snapshot_drops_duplicate_ids() {
        let snapshot = MarketSnapshot::new(
            vec![
                CoinQuote::new("bitcoin", "Bitcoin", "btc", dec!(65000)),
                CoinQuote::new("ethereum", "Ethereum", "eth", dec!(3200)),
                CoinQuote::new("bitcoin", "Bitcoin (dup)", "btc", dec!(1)),
            ],
            "test",
        );

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("bitcoin").unwrap().current_price, dec!(65000));
        assert_eq!(snapshot.quotes()[1].id, "ethereum");
    }

    #[test]
    fn test_condition_is_inclusive() {
        assert!(AlertCondition::Above.is_met(dec!(100.00), dec!(100)));
        assert!(AlertCondition::Below.is_met(dec!(100), dec!(100.00)));
        assert!(!AlertCondition::Above.is_met(dec!(99.99), dec!(100)));
        assert!(!AlertCondition::Below.is_met(dec!(100.01), dec!(100)));
    }

    #[test]
    fn test_new_alert_copies_display_fields() {
        let quote = CoinQuote::new("solana", "Solana", "sol", dec!(150));
        let alert = NewAlert::for_quote(&quote, dec!(200), AlertCondition::Above, "alice");

        assert_eq!(alert.coin_name, "Solana");
        assert_eq!(alert.symbol, "SOL");
        assert!(alert.is_active);
        assert!(alert.validate().is_ok());
    }

    #[test]
    fn test_new_alert_rejects_non_positive_target() {
        let quote = CoinQuote::new("solana", "Solana", "sol", dec!(150));
        let alert = NewAlert::for_quote(&quote, dec!(0), AlertCondition::Below, "alice");
        assert!(alert.validate().is_err());
    }

    #[test]
    fn test_new_holding_validation() {
        let quote = CoinQuote::new("bitcoin", "Bitcoin", "btc", dec!(1));
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        assert!(NewHolding::for_quote(&quote, dec!(1), dec!(0), date)
            .validate()
            .is_ok());
        assert!(NewHolding::for_quote(&quote, dec!(0), dec!(10), date)
            .validate()
            .is_err());
        assert!(NewHolding::for_quote(&quote, dec!(1), dec!(-1), date)
            .validate()
            .is_err());
    }

    #[test]
    fn test_trigger_message() {
        let alert = Alert {
            id: "a1".into(),
            coin_id: "bitcoin".into(),
            coin_name: "Bitcoin".into(),
            symbol: "BTC".into(),
            target_price: dec!(60000),
            condition: AlertCondition::Above,
            is_active: true,
            owner: "alice".into(),
        };
        let event = TriggerEvent::new(&alert, dec!(61234.5));
        assert_eq!(
            event.message(),
            "Bitcoin (BTC) is now $61234.50 (above $60000)"
        );
    }

    #[test]
    fn test_alert_serializes_camel_case() {
        let patch = AlertPatch::deactivate();
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "isActive": false }));
    }
}
