//! Error types for currency handling.

use thiserror::Error;

/// Errors raised while validating currency codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    /// Code is not a three-letter alphabetic ISO 4217 code.
    #[error("Invalid currency code: {0:?}")]
    InvalidCode(String),

    /// Code is well-formed but not in the currency registry.
    #[error("Unsupported currency: {0}")]
    Unsupported(String),
}

impl CurrencyError {
    /// Get error code for reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            CurrencyError::InvalidCode(_) => "INVALID_CURRENCY_CODE",
            CurrencyError::Unsupported(_) => "UNSUPPORTED_CURRENCY",
        }
    }
}
