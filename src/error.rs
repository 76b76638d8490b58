//! Error types for the market watch engine

use thiserror::Error;

/// Errors that can occur when fetching data from a provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network request failed
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Invalid response from provider
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider answered successfully but with no usable data
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Coin id unknown to this provider
    #[error("Coin not found: {0}")]
    NotFound(String),

    /// Provider API error
    #[error("Provider API error: {0}")]
    ApiError(String),

    /// Timeout waiting for response
    #[error("Request timeout")]
    Timeout,
}

impl ProviderError {
    /// True when a retry may succeed; a missing coin or bad payload will not
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ProviderError::NotFound(_)
                | ProviderError::InvalidResponse(_)
                | ProviderError::EmptyResponse(_)
        )
    }
}

/// Errors raised by an alert or holding store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached or refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// No record with this id
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Record payload rejected
    #[error("Invalid record: {0}")]
    Invalid(String),
}

/// Error returned by a notification sink that could not deliver an event
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Engine-level error taxonomy
///
/// Every failure is scoped to a single refresh, coin, alert or holding. None of
/// these variants is fatal to the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Network failure or timeout, retried next cycle
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    /// Provider returned empty or malformed data
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Alert or holding mutation failed
    #[error("Store persist failure: {0}")]
    StorePersistFailure(String),

    /// Coin id unknown to the provider
    #[error("Coin not found: {coin_id}")]
    NotFound { coin_id: String },

    /// Caller supplied an invalid value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Creates a NotFound error
    pub fn not_found(coin_id: &str) -> Self {
        Self::NotFound {
            coin_id: coin_id.to_string(),
        }
    }

    /// Creates an InvalidInput error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates an Internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the same operation may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::TransientFetch(_) | EngineError::StorePersistFailure(_)
        )
    }
}

impl From<ProviderError> for EngineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(coin_id) => EngineError::NotFound { coin_id },
            ProviderError::InvalidResponse(_) | ProviderError::EmptyResponse(_) => {
                EngineError::DataUnavailable(err.to_string())
            }
            // Anything we cannot positively classify is retried next cycle.
            ProviderError::NetworkError(_)
            | ProviderError::RateLimitExceeded
            | ProviderError::ApiError(_)
            | ProviderError::Timeout => EngineError::TransientFetch(err.to_string()),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::StorePersistFailure(err.to_string())
    }
}
