//! Monetary amounts held in minor units.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::currency::Currency;

/// A monetary amount in the minor units of its currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (cents for USD, yen for JPY).
    pub cents: i64,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(cents: i64, currency: Currency) -> Self {
        Self { cents, currency }
    }

    /// Create a zero amount in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self { cents: 0, currency }
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Check if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Amount in major units, given the currency's subunit ratio.
    ///
    /// Returns `None` for a zero ratio.
    pub fn to_major(&self, subunit_ratio: u32) -> Option<Decimal> {
        Decimal::from(self.cents).checked_div(Decimal::from(subunit_ratio))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (minor units)", self.cents, self.currency)
    }
}
