//! Output formatting for the command line.

use ratebank_common::Money;
use ratebank_fx::{CacheBookkeeping, RateTable, RefreshOutcome};
use serde_json::{json, Value};

/// Render the rate table as aligned text, one currency per line.
pub fn rates_text(table: &RateTable, bookkeeping: &CacheBookkeeping) -> String {
    let mut out = String::new();

    if let Some(as_of) = bookkeeping.rates_updated_at {
        out.push_str(&format!("Rates as of {} (base {})\n", as_of.format("%Y-%m-%d"), table.base()));
    } else {
        out.push_str(&format!("No rates loaded (base {})\n", table.base()));
    }

    for currency in table.currencies() {
        if let Some(rate) = table.get(&currency) {
            out.push_str(&format!("{:<4}{:>16}\n", currency.code(), rate.to_string()));
        }
    }

    out
}

/// Render the rate table as JSON.
pub fn rates_json(table: &RateTable, bookkeeping: &CacheBookkeeping) -> Value {
    let rates: serde_json::Map<String, Value> = table
        .currencies()
        .into_iter()
        .filter_map(|c| table.get(&c).map(|r| (c.to_string(), json!(r.to_string()))))
        .collect();

    json!({
        "base": table.base().code(),
        "generation": table.generation(),
        "rates_updated_at": bookkeeping.rates_updated_at.map(|t| t.to_rfc3339()),
        "last_updated": bookkeeping.last_updated.map(|t| t.to_rfc3339()),
        "rates": rates,
    })
}

/// One-line summary of a refresh.
pub fn refresh_summary(outcome: &RefreshOutcome) -> String {
    format!(
        "Loaded {} rates from {:?} (as of {})",
        outcome.currencies,
        outcome.source,
        outcome.as_of.format("%Y-%m-%d")
    )
}

/// Render a conversion as `input -> output`, in major units.
///
/// A side without a usable subunit ratio is shown in minor units.
pub fn conversion_text(
    input: &Money,
    input_ratio: Option<u32>,
    output: &Money,
    output_ratio: Option<u32>,
) -> String {
    format!(
        "{} -> {}",
        amount_text(input, input_ratio),
        amount_text(output, output_ratio)
    )
}

fn amount_text(money: &Money, subunit_ratio: Option<u32>) -> String {
    match subunit_ratio.and_then(|ratio| money.to_major(ratio)) {
        Some(major) => format!("{} {}", major.normalize(), money.currency),
        None => money.to_string(),
    }
}
