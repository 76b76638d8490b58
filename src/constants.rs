//! Constants for the market watch engine
//!
//! Compile-time defaults for every tunable. `EngineConfig::default()` is built
//! from these values and `EngineConfig::from_env()` overlays environment
//! overrides on top of them.

/// How often the poller refreshes the market snapshot (in seconds)
pub const REFRESH_INTERVAL_SECS: u64 = 30;

/// Delay between the first data load and the first alert evaluation (in milliseconds)
pub const ALERT_START_DELAY_MS: u64 = 2000;

/// How long before a snapshot is considered stale (in seconds)
pub const STALE_THRESHOLD_SECS: u64 = 300;

/// HTTP request timeout for a single provider call (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum number of attempts for one snapshot refresh
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Initial backoff delay between refresh attempts (in milliseconds)
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay between refresh attempts (in milliseconds)
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Coins per dashboard page
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Decimal places kept on profit/loss percentages
pub const PERCENT_DECIMALS: u32 = 2;

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko endpoint for the ranked market list
pub const COINGECKO_MARKETS_ENDPOINT: &str = "/coins/markets";

/// CoinGecko endpoint prefix for per-coin detail
pub const COINGECKO_COIN_ENDPOINT: &str = "/coins";

/// Largest page CoinGecko serves from `/coins/markets`
pub const COINGECKO_MARKETS_PER_PAGE: u32 = 250;

/// How many market pages make up one snapshot
pub const DEFAULT_MARKET_PAGES: u32 = 1;

/// User agent for HTTP requests
pub const USER_AGENT: &str = "market-watch-engine/0.1.0";
