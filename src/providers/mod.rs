//! Market data provider implementations

pub mod coingecko;
pub mod failover;

pub use coingecko::CoinGeckoProvider;
pub use failover::FailoverProvider;
