use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One minute bar. Prices are decimals end to end; float drift across
/// repeated ingestions of the same file would break deterministic ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Basic OHLCV sanity check: volume >= 0, high >= low, bounds contain
    /// open and close.
    pub fn is_sane(&self) -> bool {
        self.volume >= Decimal::ZERO
            && self.high >= self.low
            && self.open >= self.low
            && self.open <= self.high
            && self.close >= self.low
            && self.close <= self.high
    }

    /// UTC calendar date of the bar. Session grouping keys on this.
    pub fn trading_date(&self) -> NaiveDate {
        self.ts.date_naive()
    }
}

/// A closed minute-resolution series for one symbol.
///
/// Construction preserves the given order; out-of-order bars, duplicates
/// and gaps are the continuity validator's business, not ours. Sorting
/// here would hide ordering violations from the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeries {
    pub symbol: String,
    pub candles: Vec<Candle>,
}

impl RawSeries {
    pub fn new(symbol: impl Into<String>, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            candles,
        }
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.candles.iter().map(|c| c.ts).collect()
    }

    pub fn first_ts(&self) -> Option<DateTime<Utc>> {
        self.candles.first().map(|c| c.ts)
    }

    pub fn last_ts(&self) -> Option<DateTime<Utc>> {
        self.candles.last().map(|c| c.ts)
    }
}
