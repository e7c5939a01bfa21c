//! Base-currency rate table behind a single exclusive lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use ratebank_common::Currency;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{FxError, FxResult};
use crate::parser::FeedSnapshot;

/// One generation of base-relative rates.
///
/// Tables are immutable once built; the store swaps whole tables.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    base: Currency,
    rates: HashMap<Currency, Decimal>,
    generation: u64,
}

impl RateTable {
    fn empty(base: Currency) -> Self {
        let mut rates = HashMap::new();
        rates.insert(base.clone(), Decimal::ONE);
        Self {
            base,
            rates,
            generation: 0,
        }
    }

    fn from_snapshot(base: &Currency, snapshot: &FeedSnapshot, generation: u64) -> Self {
        let mut rates: HashMap<Currency, Decimal> = snapshot.rates.iter().cloned().collect();
        rates.insert(base.clone(), Decimal::ONE);
        Self {
            base: base.clone(),
            rates,
            generation,
        }
    }

    /// Currency every rate is expressed against.
    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Rate for `currency`; the base currency is always 1.
    pub fn get(&self, currency: &Currency) -> Option<Decimal> {
        if *currency == self.base {
            return Some(Decimal::ONE);
        }
        self.rates.get(currency).copied()
    }

    /// Monotonic number of the refresh that produced this table. 0 = never refreshed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of currencies, base included.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Always false; the base entry is present in every table.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Iterate over all entries, base included.
    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &Decimal)> {
        self.rates.iter()
    }

    /// Sorted currency codes.
    pub fn currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.rates.keys().cloned().collect();
        currencies.sort();
        currencies
    }
}

/// Thread-safe holder of the current [`RateTable`].
pub struct RateStore {
    base: Currency,
    table: Mutex<Arc<RateTable>>,
}

impl RateStore {
    /// Create a store holding only the base currency.
    pub fn new(base: Currency) -> Self {
        Self {
            table: Mutex::new(Arc::new(RateTable::empty(base.clone()))),
            base,
        }
    }

    /// Base-relative rate for `currency`.
    pub fn get(&self, currency: &Currency) -> Option<Decimal> {
        self.table.lock().get(currency)
    }

    /// Both rates of a pair, read under one lock acquisition.
    pub fn get_pair(&self, from: &Currency, to: &Currency) -> (Option<Decimal>, Option<Decimal>) {
        let table = self.table.lock();
        (table.get(from), table.get(to))
    }

    /// Install a new table built from `snapshot`. Returns the new generation.
    ///
    /// The table is built before the lock is taken; the lock only covers
    /// the swap.
    pub fn replace_all(&self, snapshot: &FeedSnapshot) -> u64 {
        let mut next = RateTable::from_snapshot(&self.base, snapshot, 0);

        let mut table = self.table.lock();
        next.generation = table.generation + 1;
        let generation = next.generation;
        *table = Arc::new(next);
        drop(table);

        debug!(generation, currencies = snapshot.len(), "Rate table replaced");
        generation
    }

    /// Override a single rate by installing a copy of the current table.
    pub fn set_rate(&self, currency: &Currency, rate: Decimal) -> FxResult<u64> {
        if rate <= Decimal::ZERO {
            return Err(FxError::InvalidRate {
                currency: currency.clone(),
                rate,
            });
        }

        if *currency == self.base {
            return Err(FxError::InvalidRate {
                currency: currency.clone(),
                rate,
            });
        }

        let mut table = self.table.lock();

        let mut next = RateTable::clone(&table);
        next.rates.insert(currency.clone(), rate);
        next.generation = table.generation + 1;
        let generation = next.generation;
        *table = Arc::new(next);

        debug!(currency = %currency, rate = %rate, generation, "Rate overridden");
        Ok(generation)
    }

    /// The current table.
    pub fn snapshot(&self) -> Arc<RateTable> {
        Arc::clone(&self.table.lock())
    }

    /// Base currency of the store. Fixed at construction.
    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Sorted currency codes in the current table.
    pub fn currencies(&self) -> Vec<Currency> {
        self.snapshot().currencies()
    }

    /// Whether any refresh has been applied.
    pub fn is_populated(&self) -> bool {
        self.table.lock().generation > 0
    }
}
