//! Minor-unit currency conversion over the rate table.

use std::sync::Arc;

use ratebank_common::{Currency, CurrencyError, CurrencyRegistry, Money};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, instrument};

use crate::error::{FxError, FxResult};
use crate::store::RateStore;

/// Rounding applied once, to the final minor-unit amount.
pub const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Converts amounts between currencies using base-relative rates.
///
/// Stored rates are all against the base currency, so a pair of non-base
/// currencies is priced by triangulation: `rate(to) / rate(from)`.
pub struct ConversionEngine {
    store: Arc<RateStore>,
    registry: Arc<dyn CurrencyRegistry>,
}

impl ConversionEngine {
    /// Create an engine reading from `store`.
    pub fn new(store: Arc<RateStore>, registry: Arc<dyn CurrencyRegistry>) -> Self {
        Self { store, registry }
    }

    /// The underlying rate store.
    pub fn store(&self) -> &Arc<RateStore> {
        &self.store
    }

    /// Convert `amount` minor units of `from` into minor units of `to`.
    ///
    /// Computes `amount * to_ratio * rate(to) / (from_ratio * rate(from))`
    /// exactly and rounds half away from zero once at the end.
    #[instrument(skip(self, from, to), fields(from = %from, to = %to))]
    pub fn convert(
        &self,
        amount: i64,
        from: &Currency,
        to: &Currency,
        from_ratio: u32,
        to_ratio: u32,
    ) -> FxResult<i64> {
        for (currency, ratio) in [(from, from_ratio), (to, to_ratio)] {
            if ratio == 0 {
                return Err(FxError::InvalidSubunitRatio {
                    currency: currency.clone(),
                    ratio,
                });
            }
        }

        if from == to && from_ratio == to_ratio {
            return Ok(amount);
        }

        let (rate_from, rate_to) = self.rates_for(from, to)?;

        let numerator = Decimal::from(amount)
            .checked_mul(Decimal::from(to_ratio))
            .and_then(|n| n.checked_mul(rate_to))
            .ok_or(FxError::Overflow)?;
        let denominator = Decimal::from(from_ratio)
            .checked_mul(rate_from)
            .ok_or(FxError::Overflow)?;

        let exact = numerator.checked_div(denominator).ok_or(FxError::Overflow)?;
        let converted = exact
            .round_dp_with_strategy(0, ROUNDING)
            .to_i64()
            .ok_or(FxError::Overflow)?;

        debug!(amount, converted, exact = %exact, "Converted amount");
        Ok(converted)
    }

    /// Price of one unit of `from` in units of `to`.
    pub fn cross_rate(&self, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let (rate_from, rate_to) = self.rates_for(from, to)?;
        rate_to.checked_div(rate_from).ok_or(FxError::Overflow)
    }

    /// Convert a [`Money`] value, taking subunit ratios from the registry.
    pub fn exchange(&self, money: &Money, to: &Currency) -> FxResult<Money> {
        let from_ratio = self.subunit_ratio(&money.currency)?;
        let to_ratio = self.subunit_ratio(to)?;
        let cents = self.convert(money.cents, &money.currency, to, from_ratio, to_ratio)?;
        Ok(Money::new(cents, to.clone()))
    }

    /// Convert `cents` between two currency codes given as strings.
    pub fn exchange_codes(&self, cents: i64, from: &str, to: &str) -> FxResult<Money> {
        let from = self.registry.resolve(from)?;
        let to = self.registry.resolve(to)?;
        self.exchange(&Money::new(cents, from), &to)
    }

    fn subunit_ratio(&self, currency: &Currency) -> FxResult<u32> {
        self.registry
            .subunit_ratio(currency)
            .ok_or_else(|| CurrencyError::Unsupported(currency.code().to_string()).into())
    }

    /// Both base-relative rates from one table generation.
    fn rates_for(&self, from: &Currency, to: &Currency) -> FxResult<(Decimal, Decimal)> {
        match self.store.get_pair(from, to) {
            (Some(rate_from), Some(rate_to)) => Ok((rate_from, rate_to)),
            (None, _) => Err(FxError::UnknownCurrency(from.clone())),
            (_, None) => Err(FxError::UnknownCurrency(to.clone())),
        }
    }
}
