//! # Market Watch Engine
//!
//! Polls cryptocurrency market data, fires one-shot price alerts and values a
//! held portfolio at live prices.
//!
//! ## Components
//!
//! - [`PriceSnapshotCache`] holds the latest full market snapshot.
//! - [`MarketPoller`] refreshes it every interval and on demand, coalescing
//!   concurrent refreshes.
//! - [`AlertEvaluator`] checks active alerts against per-coin detail prices and
//!   deactivates each alert the first time its condition holds.
//! - [`PortfolioValuator`] computes cost, value and profit/loss per holding.
//! - [`paging::page`] slices the coin list for display.
//!
//! Alert and holding persistence, notification delivery and the price source
//! are collaborators behind the [`RecordStore`], [`NotificationSink`] and
//! [`MarketDataProvider`] traits.
//!
//! ## Usage
//!
//! ```no_run
//! use market_watch_engine::{Alert, EngineConfig, Holding, LogSink, MarketWatch, MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let watch = MarketWatch::with_coingecko(
//!     EngineConfig::from_env(),
//!     Arc::new(MemoryStore::<Alert>::new()),
//!     Arc::new(MemoryStore::<Holding>::new()),
//!     Arc::new(LogSink::new()),
//! )?;
//! watch.start();
//!
//! // Top of the dashboard once the first snapshot is in
//! watch.cache().wait_for_data().await;
//! for coin in watch.dashboard_page("", 1).items {
//!     println!("{}: ${:.2}", coin.symbol, coin.current_price);
//! }
//!
//! let portfolio = watch.portfolio().await?;
//! println!("P/L: {}%", portfolio.totals.profit_loss_percent);
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod cache;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod metrics;
pub mod notify;
pub mod paging;
pub mod poller;
pub mod portfolio;
pub mod provider;
pub mod providers;
pub mod schedule;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use alerts::{AlertEvaluator, EvaluationReport, SkippedAlert};
pub use cache::PriceSnapshotCache;
pub use config::{EngineConfig, ProviderKind};
pub use engine::{DashboardPage, MarketWatch};
pub use error::{EngineError, ProviderError, SinkError, StoreError};
pub use metrics::{EndpointMetrics, FetchMetrics};
pub use notify::{ChannelSink, CompositeSink, LogSink, NotificationSink};
pub use paging::CoinPage;
pub use poller::MarketPoller;
pub use portfolio::{HoldingValuation, PortfolioValuation, PortfolioValuator, ValuationTotals};
pub use provider::MarketDataProvider;
pub use store::{MemoryStore, RecordStore};
pub use types::{
    Alert, AlertCondition, AlertPatch, CoinQuote, ComponentHealth, HealthStatus, Holding,
    HoldingPatch, MarketEvent, MarketSnapshot, NewAlert, NewHolding, TriggerEvent,
};
