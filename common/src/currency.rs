//! Currency codes and currency metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CurrencyError;

/// ISO 4217 currency code.
///
/// Always three uppercase ASCII letters. Lowercase input is accepted and
/// normalised; anything else is rejected when the code is parsed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse and normalise a currency code.
    pub fn parse(code: &str) -> Result<Self, CurrencyError> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(CurrencyError::InvalidCode(code.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Common currencies
    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn gbp() -> Self {
        Self("GBP".to_string())
    }

    pub fn jpy() -> Self {
        Self("JPY".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Source of per-currency metadata.
pub trait CurrencyRegistry: Send + Sync {
    /// Number of minor units in one major unit (100 for cents, 1 for yen).
    fn subunit_ratio(&self, currency: &Currency) -> Option<u32>;

    /// Check whether the code names a currency this registry knows.
    fn is_valid_code(&self, code: &str) -> bool;

    /// Parse a code and check it against the registry.
    fn resolve(&self, code: &str) -> Result<Currency, CurrencyError> {
        let currency = Currency::parse(code)?;
        if !self.is_valid_code(currency.code()) {
            return Err(CurrencyError::Unsupported(currency.code().to_string()));
        }
        Ok(currency)
    }
}

/// Currencies quoted by the reference rate feed, with their subunit ratios.
pub const SUPPORTED_CURRENCIES: &[(&str, u32)] = &[
    ("EUR", 100),
    ("USD", 100),
    ("JPY", 1),
    ("BGN", 100),
    ("CZK", 100),
    ("DKK", 100),
    ("GBP", 100),
    ("HUF", 100),
    ("ILS", 100),
    ("ISK", 1),
    ("LTL", 100),
    ("PLN", 100),
    ("RON", 100),
    ("SEK", 100),
    ("CHF", 100),
    ("NOK", 100),
    ("HRK", 100),
    ("RUB", 100),
    ("TRY", 100),
    ("AUD", 100),
    ("BRL", 100),
    ("CAD", 100),
    ("CNY", 100),
    ("HKD", 100),
    ("IDR", 100),
    ("INR", 100),
    ("KRW", 1),
    ("MXN", 100),
    ("MYR", 100),
    ("NZD", 100),
    ("PHP", 100),
    ("SGD", 100),
    ("THB", 100),
    ("ZAR", 100),
];

/// Registry backed by the static [`SUPPORTED_CURRENCIES`] table.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoCurrencyRegistry;

impl IsoCurrencyRegistry {
    /// Create a new registry.
    pub fn new() -> Self {
        Self
    }

    /// All supported currencies, in table order.
    pub fn currencies(&self) -> impl Iterator<Item = Currency> {
        SUPPORTED_CURRENCIES
            .iter()
            .map(|(code, _)| Currency(code.to_string()))
    }

    fn lookup(code: &str) -> Option<u32> {
        SUPPORTED_CURRENCIES
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, ratio)| *ratio)
    }
}

impl CurrencyRegistry for IsoCurrencyRegistry {
    fn subunit_ratio(&self, currency: &Currency) -> Option<u32> {
        Self::lookup(currency.code())
    }

    fn is_valid_code(&self, code: &str) -> bool {
        Self::lookup(code).is_some()
    }
}
