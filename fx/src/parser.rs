//! Reference rate feed parsing.
//!
//! The feed is an XML envelope of nested `Cube` elements:
//!
//! ```text
//! gesmes:Envelope
//!   Cube
//!     Cube time="2024-01-05"
//!       Cube currency="USD" rate="1.0921"
//!       ...
//! ```
//!
//! Elements are matched by local name, so the namespace prefixes used by
//! the publisher do not matter. Only the first dated `Cube` is read.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use ratebank_common::Currency;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{FxError, FxResult};

const ENVELOPE: &[u8] = b"Envelope";
const CUBE: &[u8] = b"Cube";

/// One complete set of base-relative rates read from a single feed document.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    /// Timestamp embedded in the feed.
    pub as_of: DateTime<Utc>,
    /// Rate entries in document order.
    pub rates: Vec<(Currency, Decimal)>,
}

impl FeedSnapshot {
    /// Number of rate entries.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Check if the snapshot carries no rates.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Parser for ECB-style reference rate feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateFeedParser;

impl RateFeedParser {
    /// Parse raw feed bytes into a snapshot.
    ///
    /// Any malformed rate node fails the whole document.
    pub fn parse(bytes: &[u8]) -> FxResult<FeedSnapshot> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut saw_envelope = false;
        let mut dated_cubes = 0usize;
        let mut in_snapshot = false;
        let mut as_of = None;
        let mut rates = Vec::new();
        let mut seen = HashSet::new();

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                FxError::Parse(format!(
                    "malformed document at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            })?;

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let name = e.local_name().as_ref().to_vec();
                    let depth = path.len();

                    if depth == 0 {
                        if name != ENVELOPE {
                            return Err(FxError::Parse(format!(
                                "unexpected root element <{}>",
                                String::from_utf8_lossy(&name)
                            )));
                        }
                        saw_envelope = true;
                    } else if name == CUBE && depth == 2 && path[1] == CUBE {
                        dated_cubes += 1;
                        if dated_cubes == 1 {
                            as_of = Some(Self::read_time(e)?);
                            in_snapshot = !is_empty;
                        } else {
                            debug!(dated_cubes, "Ignoring additional dated cube");
                        }
                    } else if name == CUBE && depth >= 3 && in_snapshot {
                        let (currency, rate) = Self::read_rate(e)?;
                        if !seen.insert(currency.clone()) {
                            return Err(FxError::Parse(format!(
                                "duplicate rate for {}",
                                currency
                            )));
                        }
                        rates.push((currency, rate));
                    }

                    if !is_empty {
                        path.push(name);
                    }
                }
                Event::End(_) => {
                    path.pop();
                    if path.len() == 2 {
                        in_snapshot = false;
                    }
                }
                Event::Eof => break,
                _ => {}
            }

            buf.clear();
        }

        if !path.is_empty() {
            return Err(FxError::Parse(format!(
                "unexpected end of document inside <{}>",
                String::from_utf8_lossy(path.last().map(Vec::as_slice).unwrap_or_default())
            )));
        }

        if !saw_envelope {
            return Err(FxError::Parse("missing Envelope element".to_string()));
        }

        let as_of = as_of
            .ok_or_else(|| FxError::Parse("missing dated Cube element".to_string()))?;

        if rates.is_empty() {
            return Err(FxError::Parse("feed contains no rate nodes".to_string()));
        }

        debug!(currencies = rates.len(), as_of = %as_of, "Parsed rate feed");

        Ok(FeedSnapshot { as_of, rates })
    }

    /// Parse a feed held in a string.
    pub fn parse_str(content: &str) -> FxResult<FeedSnapshot> {
        Self::parse(content.as_bytes())
    }

    fn read_time(element: &BytesStart<'_>) -> FxResult<DateTime<Utc>> {
        let value = Self::attribute(element, b"time")?
            .ok_or_else(|| FxError::Parse("dated Cube has no time attribute".to_string()))?;
        Self::parse_timestamp(&value)
    }

    fn read_rate(element: &BytesStart<'_>) -> FxResult<(Currency, Decimal)> {
        let code = Self::attribute(element, b"currency")?
            .ok_or_else(|| FxError::Parse("rate node has no currency attribute".to_string()))?;
        let value = Self::attribute(element, b"rate")?.ok_or_else(|| {
            FxError::Parse(format!("rate node for {} has no rate attribute", code))
        })?;

        let currency = Currency::parse(&code)
            .map_err(|e| FxError::Parse(format!("rate node: {}", e)))?;
        let rate = Decimal::from_str_exact(value.trim()).map_err(|e| {
            FxError::Parse(format!("rate {:?} for {} is not a number: {}", value, currency, e))
        })?;

        if rate <= Decimal::ZERO {
            return Err(FxError::Parse(format!(
                "rate {} for {} is not positive",
                rate, currency
            )));
        }

        Ok((currency, rate))
    }

    fn attribute(element: &BytesStart<'_>, key: &[u8]) -> FxResult<Option<String>> {
        for attr in element.attributes() {
            let attr = attr.map_err(|e| FxError::Parse(format!("bad attribute: {}", e)))?;
            if attr.key.local_name().as_ref() == key {
                let value = attr
                    .unescape_value()
                    .map_err(|e| FxError::Parse(format!("bad attribute value: {}", e)))?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }

    /// Accepts `YYYY-MM-DD` (midnight UTC) or RFC 3339.
    fn parse_timestamp(value: &str) -> FxResult<DateTime<Utc>> {
        let value = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(Utc.from_utc_datetime(&midnight));
            }
        }
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| FxError::Parse(format!("invalid feed timestamp {:?}", value)))
    }
}
