//! Portfolio valuation from holdings and live prices
//!
//! `valuate` is a pure function of its inputs. Fetching prices is a separate
//! step (`PortfolioValuator::resolve_prices`) so the arithmetic can be re-run
//! on every refresh and tested without a provider.

use crate::{
    constants::PERCENT_DECIMALS,
    error::EngineError,
    lookup::DetailLookup,
    store::HoldingStore,
    types::{Holding, MarketSnapshot},
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Source of current prices keyed by coin id
pub trait PriceLookup {
    fn price_of(&self, coin_id: &str) -> Option<Decimal>;
}

impl PriceLookup for HashMap<String, Decimal> {
    fn price_of(&self, coin_id: &str) -> Option<Decimal> {
        self.get(coin_id).copied()
    }
}

impl PriceLookup for MarketSnapshot {
    fn price_of(&self, coin_id: &str) -> Option<Decimal> {
        self.get(coin_id).map(|quote| quote.current_price)
    }
}

/// Prices resolved for one valuation, with the lookups that failed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceBook {
    prices: HashMap<String, Decimal>,
    failures: HashMap<String, EngineError>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coin_id: impl Into<String>, price: Decimal) {
        self.prices.insert(coin_id.into(), price);
    }

    pub fn insert_failure(&mut self, coin_id: impl Into<String>, error: EngineError) {
        self.failures.insert(coin_id.into(), error);
    }

    /// Why a coin has no price, if its lookup failed
    pub fn failure(&self, coin_id: &str) -> Option<&EngineError> {
        self.failures.get(coin_id)
    }
}

impl PriceLookup for PriceBook {
    fn price_of(&self, coin_id: &str) -> Option<Decimal> {
        self.prices.get(coin_id).copied()
    }
}

/// Valuation of one holding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingValuation {
    pub holding_id: String,
    pub coin_id: String,
    pub coin_name: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub purchase_price: Decimal,
    /// Zero when no price was available
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub cost: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percent: Decimal,
    pub price_available: bool,
}

/// Portfolio-wide sums
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationTotals {
    pub market_value: Decimal,
    pub cost: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValuation {
    pub holdings: Vec<HoldingValuation>,
    pub totals: ValuationTotals,
    /// True when at least one holding was priced at zero or left out of the totals
    pub partial: bool,
    /// Coin ids without a price, sorted
    pub missing_prices: Vec<String>,
    /// Holdings whose figures exceed the decimal range, in input order
    pub overflowed: Vec<String>,
}

struct Figures {
    market_value: Decimal,
    cost: Decimal,
    profit_loss: Decimal,
    profit_loss_percent: Decimal,
}

impl Figures {
    const ZERO: Figures = Figures {
        market_value: Decimal::ZERO,
        cost: Decimal::ZERO,
        profit_loss: Decimal::ZERO,
        profit_loss_percent: Decimal::ZERO,
    };

    fn compute(quantity: Decimal, price: Decimal, purchase_price: Decimal) -> Option<Self> {
        let market_value = quantity.checked_mul(price)?;
        let cost = quantity.checked_mul(purchase_price)?;
        let profit_loss = market_value.checked_sub(cost)?;
        Some(Self {
            market_value,
            cost,
            profit_loss,
            profit_loss_percent: profit_loss_percent(profit_loss, cost)?,
        })
    }
}

/// Profit/loss as a percentage of cost; zero cost yields zero
fn profit_loss_percent(profit_loss: Decimal, cost: Decimal) -> Option<Decimal> {
    if cost.is_zero() {
        return Some(Decimal::ZERO);
    }
    let percent = profit_loss
        .checked_div(cost)?
        .checked_mul(Decimal::ONE_HUNDRED)?;
    Some(percent.round_dp(PERCENT_DECIMALS))
}

/// Values every holding and the aggregate
///
/// A holding whose figures overflow is reported with zero figures and left
/// out of the totals.
pub fn valuate(holdings: &[Holding], prices: &impl PriceLookup) -> PortfolioValuation {
    let mut missing = BTreeSet::new();
    let mut overflowed = Vec::new();
    let mut total_value = Decimal::ZERO;
    let mut total_cost = Decimal::ZERO;

    let rows: Vec<HoldingValuation> = holdings
        .iter()
        .map(|holding| {
            let price = prices.price_of(&holding.coin_id);
            if price.is_none() {
                missing.insert(holding.coin_id.clone());
            }
            let current_price = price.unwrap_or(Decimal::ZERO);

            let counted = Figures::compute(holding.quantity, current_price, holding.purchase_price)
                .and_then(|figures| {
                    let value = total_value.checked_add(figures.market_value)?;
                    let cost = total_cost.checked_add(figures.cost)?;
                    Some((figures, value, cost))
                });

            let figures = match counted {
                Some((figures, value, cost)) => {
                    total_value = value;
                    total_cost = cost;
                    figures
                }
                None => {
                    tracing::warn!(
                        holding_id = %holding.id,
                        coin_id = %holding.coin_id,
                        "Holding value out of range, excluded from totals"
                    );
                    overflowed.push(holding.id.clone());
                    Figures::ZERO
                }
            };

            HoldingValuation {
                holding_id: holding.id.clone(),
                coin_id: holding.coin_id.clone(),
                coin_name: holding.coin_name.clone(),
                symbol: holding.symbol.clone(),
                quantity: holding.quantity,
                purchase_price: holding.purchase_price,
                current_price,
                market_value: figures.market_value,
                cost: figures.cost,
                profit_loss: figures.profit_loss,
                profit_loss_percent: figures.profit_loss_percent,
                price_available: price.is_some(),
            }
        })
        .collect();

    let total_profit_loss = total_value.checked_sub(total_cost).unwrap_or(Decimal::ZERO);

    PortfolioValuation {
        holdings: rows,
        totals: ValuationTotals {
            market_value: total_value,
            cost: total_cost,
            profit_loss: total_profit_loss,
            profit_loss_percent: profit_loss_percent(total_profit_loss, total_cost)
                .unwrap_or(Decimal::ZERO),
        },
        partial: !missing.is_empty() || !overflowed.is_empty(),
        missing_prices: missing.into_iter().collect(),
        overflowed,
    }
}

/// Prices a portfolio from the holding store and live detail lookups
pub struct PortfolioValuator {
    store: Arc<HoldingStore>,
    details: DetailLookup,
}

impl PortfolioValuator {
    pub fn new(store: Arc<HoldingStore>, details: DetailLookup) -> Self {
        Self { store, details }
    }

    /// Fetches one price per distinct coin; failures are recorded, not raised
    pub async fn resolve_prices(&self, holdings: &[Holding]) -> PriceBook {
        let mut book = PriceBook::new();
        let results = self
            .details
            .fetch_many(holdings.iter().map(|h| h.coin_id.as_str()))
            .await;

        for (coin_id, result) in results {
            match result {
                Ok(quote) => book.insert(coin_id, quote.current_price),
                Err(e) => {
                    tracing::warn!(
                        coin_id = %coin_id,
                        error = %e,
                        "No price for holding, valuing at zero"
                    );
                    book.insert_failure(coin_id, e);
                }
            }
        }
        book
    }

    /// Loads holdings, resolves prices and valuates
    pub async fn refresh(&self) -> Result<PortfolioValuation, EngineError> {
        let holdings = self.store.list().await.map_err(|e| {
            tracing::warn!(error = %e, "Could not load holdings");
            EngineError::from(e)
        })?;

        let prices = self.resolve_prices(&holdings).await;
        let valuation = valuate(&holdings, &prices);

        tracing::debug!(
            holdings = valuation.holdings.len(),
            total_value = %valuation.totals.market_value,
            partial = valuation.partial,
            "Portfolio valuated"
        );
        Ok(valuation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::provider::mock::{MockFailure, MockProvider};
    use crate::store::MemoryStore;
    use crate::types::CoinQuote;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn holding(id: &str, coin_id: &str, quantity: Decimal, purchase_price: Decimal) -> Holding {
        Holding {
            id: id.to_string(),
            coin_id: coin_id.to_string(),
            coin_name: coin_id.to_string(),
            symbol: coin_id.to_uppercase(),
            quantity,
            purchase_price,
            purchase_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    fn prices(pairs: &[(&str, Decimal)]) -> HashMap<String, Decimal> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_single_holding_profit() {
        let result = valuate(
            &[holding("h1", "bitcoin", dec!(2), dec!(100))],
            &prices(&[("bitcoin", dec!(150))]),
        );

        let row = &result.holdings[0];
        assert_eq!(row.market_value, dec!(300));
        assert_eq!(row.cost, dec!(200));
        assert_eq!(row.profit_loss, dec!(100));
        assert_eq!(row.profit_loss_percent, dec!(50.00));
        assert!(!result.partial);
    }

    #[test]
    fn test_zero_cost_yields_zero_percent() {
        let result = valuate(
            &[holding("airdrop", "jito", dec!(10), dec!(0))],
            &prices(&[("jito", dec!(3))]),
        );

        assert_eq!(result.holdings[0].profit_loss, dec!(30));
        assert_eq!(result.holdings[0].profit_loss_percent, Decimal::ZERO);
        assert_eq!(result.totals.profit_loss_percent, Decimal::ZERO);
    }

    #[test]
    fn test_totals_use_aggregate_cost_and_value() {
        let result = valuate(
            &[
                holding("h1", "bitcoin", dec!(2), dec!(100)),
                holding("h2", "ethereum", dec!(1), dec!(300)),
            ],
            &prices(&[("bitcoin", dec!(150)), ("ethereum", dec!(200))]),
        );

        assert_eq!(result.totals.market_value, dec!(500));
        assert_eq!(result.totals.cost, dec!(500));
        assert_eq!(result.totals.profit_loss, dec!(0));
        assert_eq!(result.totals.profit_loss_percent, dec!(0));
        assert_eq!(result.holdings[1].profit_loss_percent, dec!(-33.33));
    }

    #[test]
    fn test_missing_price_values_holding_at_zero() {
        let result = valuate(
            &[
                holding("h1", "bitcoin", dec!(1), dec!(100)),
                holding("h2", "unknown", dec!(4), dec!(25)),
            ],
            &prices(&[("bitcoin", dec!(110))]),
        );

        let missing = &result.holdings[1];
        assert_eq!(missing.current_price, Decimal::ZERO);
        assert_eq!(missing.market_value, Decimal::ZERO);
        assert_eq!(missing.profit_loss, dec!(-100));
        assert_eq!(missing.profit_loss_percent, dec!(-100));
        assert!(!missing.price_available);

        assert!(result.partial);
        assert_eq!(result.missing_prices, vec!["unknown".to_string()]);
        assert_eq!(result.totals.market_value, dec!(110));
        assert_eq!(result.totals.cost, dec!(200));
        assert_eq!(result.totals.profit_loss_percent, dec!(-45));
    }

    #[test]
    fn test_valuation_is_deterministic() {
        let holdings = vec![
            holding("h1", "bitcoin", dec!(0.123456), dec!(43210.98)),
            holding("h2", "solana", dec!(17.5), dec!(98.7)),
        ];
        let book = prices(&[("bitcoin", dec!(65432.1)), ("solana", dec!(151.23))]);

        assert_eq!(valuate(&holdings, &book), valuate(&holdings, &book));
    }

    #[test]
    fn test_snapshot_as_price_source() {
        let snapshot = MarketSnapshot::new(
            vec![CoinQuote::new("bitcoin", "Bitcoin", "btc", dec!(150))],
            "test",
        );
        let result = valuate(&[holding("h1", "bitcoin", dec!(2), dec!(100))], &snapshot);
        assert_eq!(result.totals.profit_loss, dec!(100));
    }

    #[test]
    fn test_out_of_range_holding_is_excluded() {
        let result = valuate(
            &[
                holding("whale", "bitcoin", Decimal::MAX / dec!(2), dec!(1)),
                holding("h2", "ethereum", dec!(1), dec!(100)),
            ],
            &prices(&[("bitcoin", dec!(3)), ("ethereum", dec!(150))]),
        );

        let whale = &result.holdings[0];
        assert_eq!(whale.current_price, dec!(3));
        assert_eq!(whale.market_value, Decimal::ZERO);
        assert!(whale.price_available);

        assert_eq!(result.overflowed, vec!["whale".to_string()]);
        assert!(result.partial);
        assert!(result.missing_prices.is_empty());
        assert_eq!(result.holdings[1].market_value, dec!(150));
        assert_eq!(result.totals.market_value, dec!(150));
        assert_eq!(result.totals.profit_loss_percent, dec!(50));
    }

    #[test]
    fn test_totals_overflow_drops_the_holding_that_overflows() {
        let big = Decimal::MAX / dec!(4);
        let result = valuate(
            &[
                holding("h1", "bitcoin", big, dec!(1)),
                holding("h2", "bitcoin", big, dec!(1)),
            ],
            &prices(&[("bitcoin", dec!(3))]),
        );

        assert_eq!(result.overflowed, vec!["h2".to_string()]);
        assert_eq!(result.totals.market_value, result.holdings[0].market_value);
        assert_eq!(result.totals.cost, big);
    }

    #[test]
    fn test_empty_portfolio() {
        let result = valuate(&[], &HashMap::new());
        assert!(result.holdings.is_empty());
        assert_eq!(result.totals.market_value, Decimal::ZERO);
        assert_eq!(result.totals.profit_loss_percent, Decimal::ZERO);
        assert!(!result.partial);
        assert!(result.overflowed.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_isolates_failed_lookup() {
        let provider = Arc::new(MockProvider::new());
        provider.set_price("bitcoin", dec!(150));
        provider.set_detail_error("ethereum", MockFailure::Timeout);

        let store = Arc::new(MemoryStore::with_records(vec![
            holding("h1", "bitcoin", dec!(2), dec!(100)),
            holding("h2", "ethereum", dec!(1), dec!(3000)),
            holding("h3", "bitcoin", dec!(1), dec!(50)),
        ]));
        let valuator = PortfolioValuator::new(
            store,
            DetailLookup::new(
                provider.clone(),
                Arc::new(MetricsCollector::new("mock")),
                Duration::from_secs(10),
            ),
        );

        let result = valuator.refresh().await.unwrap();

        assert_eq!(provider.detail_calls(), 2);
        assert!(result.partial);
        assert_eq!(result.missing_prices, vec!["ethereum".to_string()]);
        assert_eq!(result.holdings[0].market_value, dec!(300));
        assert_eq!(result.holdings[2].market_value, dec!(150));
        assert_eq!(result.totals.market_value, dec!(450));
        assert_eq!(result.totals.cost, dec!(3250));
    }

    #[tokio::test]
    async fn test_resolve_prices_records_failures() {
        let provider = Arc::new(MockProvider::new());
        let valuator = PortfolioValuator::new(
            Arc::new(MemoryStore::<Holding>::new()),
            DetailLookup::new(
                provider,
                Arc::new(MetricsCollector::new("mock")),
                Duration::from_secs(10),
            ),
        );

        let book = valuator
            .resolve_prices(&[holding("h1", "nope", dec!(1), dec!(1))])
            .await;
        assert_eq!(book.price_of("nope"), None);
        assert_eq!(book.failure("nope"), Some(&EngineError::not_found("nope")));
    }
}
