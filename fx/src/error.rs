//! Rate cache and conversion error types.

use ratebank_common::{Currency, CurrencyError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur while refreshing rates or converting amounts.
#[derive(Debug, Error)]
pub enum FxError {
    /// Feed document could not be turned into a rate snapshot.
    #[error("Feed parse error: {0}")]
    Parse(String),

    /// Feed could not be fetched (transport failure, bad status, timeout).
    #[error("Feed fetch error: {0}")]
    Fetch(String),

    /// No cache identifier configured, or the cache cannot be used.
    #[error("Invalid cache: {0}")]
    InvalidCache(String),

    /// A persisted cache was requested but none exists.
    #[error("Missing cache: {0}")]
    MissingCache(String),

    /// Currency has no entry in the rate table.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(Currency),

    /// Currency code rejected at the API boundary.
    #[error(transparent)]
    InvalidCurrency(#[from] CurrencyError),

    /// Rate override is not a positive number.
    #[error("Invalid rate {rate} for {currency}")]
    InvalidRate { currency: Currency, rate: Decimal },

    /// Cache storage write failed.
    #[error("Cache storage error: {0}")]
    Storage(String),

    /// Subunit ratio passed to a conversion is zero.
    #[error("Invalid subunit ratio {ratio} for {currency}")]
    InvalidSubunitRatio { currency: Currency, ratio: u32 },

    /// Decimal computation exceeded the representable range.
    #[error("Arithmetic overflow during conversion")]
    Overflow,

    /// Configuration rejected by validation.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FxError {
    /// Whether a network refresh should degrade to the persisted cache.
    ///
    /// Only malformed feed documents qualify. Transport failures always
    /// surface to the caller.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(self, FxError::Parse(_))
    }

    /// Get error code for reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::Parse(_) => "PARSE_ERROR",
            FxError::Fetch(_) => "FETCH_ERROR",
            FxError::InvalidCache(_) => "INVALID_CACHE",
            FxError::MissingCache(_) => "MISSING_CACHE",
            FxError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            FxError::InvalidCurrency(_) => "INVALID_CURRENCY",
            FxError::InvalidRate { .. } => "INVALID_RATE",
            FxError::Storage(_) => "STORAGE_ERROR",
            FxError::InvalidSubunitRatio { .. } => "INVALID_SUBUNIT_RATIO",
            FxError::Overflow => "OVERFLOW",
            FxError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type for rate cache operations.
pub type FxResult<T> = Result<T, FxError>;
