use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Candle;

/// Pattern classification assigned by a reviewer after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SchemaType {
    R,
    V,
    #[default]
    Unclassified,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::R => "R",
            SchemaType::V => "V",
            SchemaType::Unclassified => "UNCLASSIFIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "R" => Some(SchemaType::R),
            "V" => Some(SchemaType::V),
            "UNCLASSIFIED" => Some(SchemaType::Unclassified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Up => "UP",
            TrendDirection::Down => "DOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UP" => Some(TrendDirection::Up),
            "DOWN" => Some(TrendDirection::Down),
            _ => None,
        }
    }
}

/// One persisted ingestion batch. Segments point back at the stream that
/// created them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub symbol: String,
    pub ingested_at: DateTime<Utc>,
    pub first_ts: DateTime<Utc>,
    pub last_ts: DateTime<Utc>,
    pub point_count: usize,
}

impl Stream {
    pub fn new(
        symbol: impl Into<String>,
        first_ts: DateTime<Utc>,
        last_ts: DateTime<Utc>,
        point_count: usize,
    ) -> Self {
        let symbol = symbol.into();
        let id = deterministic_id(&[
            "stream",
            &symbol,
            &first_ts.timestamp().to_string(),
            &last_ts.timestamp().to_string(),
        ]);
        Self {
            id,
            symbol,
            ingested_at: Utc::now(),
            first_ts,
            last_ts,
            point_count,
        }
    }
}

/// Fixed-size window of consecutive minute bars within one trading day,
/// plus everything reviewers hang off it afterwards: schema classification,
/// an optional pattern point, and multi-trial feedback.
///
/// The three feedback fields are parallel space-separated numeric lists
/// ("1 0 1" / "10 5 30" / "0.4 -0.2 0.8"); parsing and normalization live
/// in `crate::feedback`, nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSegment {
    pub id: String,
    pub stream_id: String,
    pub symbol: String,
    pub trading_date: NaiveDate,
    pub segment_start: DateTime<Utc>,
    pub segment_end: DateTime<Utc>,
    pub point_count: usize,
    pub original_point_count: usize,
    pub points_in_region: usize,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub average_price: Decimal,
    pub x0: Decimal,
    pub trend: TrendDirection,
    pub points_data: Vec<Candle>,
    pub schema_type: SchemaType,
    pub pattern_point: Option<DateTime<Utc>>,
    pub is_result_correct: Option<String>,
    pub result_interval: Option<String>,
    pub result: Option<String>,
    pub invalid: bool,
}

impl AnalysisSegment {
    /// Builds a segment from a non-empty window of bars. The id is derived
    /// from symbol, date and the window's first/last timestamps, so slicing
    /// the same input twice produces the same ids.
    ///
    /// The caller enforces the minimum point count; this only refuses empty
    /// windows.
    pub fn from_points(
        symbol: &str,
        stream_id: &str,
        points: Vec<Candle>,
    ) -> Option<Self> {
        let first = points.first()?.ts;
        let last = points.last()?.ts;
        let trading_date = points.first()?.trading_date();
        let id = deterministic_id(&[
            "segment",
            symbol,
            &trading_date.to_string(),
            &first.timestamp().to_string(),
            &last.timestamp().to_string(),
        ]);
        let n = points.len();
        let mut segment = Self {
            id,
            stream_id: stream_id.to_string(),
            symbol: symbol.to_string(),
            trading_date,
            segment_start: first,
            segment_end: last,
            point_count: n,
            original_point_count: n,
            points_in_region: n,
            min_price: Decimal::ZERO,
            max_price: Decimal::ZERO,
            average_price: Decimal::ZERO,
            x0: Decimal::ZERO,
            trend: TrendDirection::Down,
            points_data: points,
            schema_type: SchemaType::default(),
            pattern_point: None,
            is_result_correct: None,
            result_interval: None,
            result: None,
            invalid: false,
        };
        segment.recompute_derived();
        Some(segment)
    }

    /// Recomputes bounds, price stats, trend and the contiguity flag from
    /// the current point payload. Called at construction and again by the
    /// reconciler after truncation. The id never changes.
    pub fn recompute_derived(&mut self) {
        let Some(first) = self.points_data.first() else {
            return;
        };
        let last = self.points_data.last().expect("non-empty points");

        self.segment_start = first.ts;
        self.segment_end = last.ts;
        self.point_count = self.points_data.len();
        self.points_in_region = self.points_data.len();

        let mut min_price = first.low;
        let mut max_price = first.high;
        for p in &self.points_data {
            if p.low < min_price {
                min_price = p.low;
            }
            if p.high > max_price {
                max_price = p.high;
            }
        }
        self.min_price = min_price.round_dp(4);
        self.max_price = max_price.round_dp(4);
        // Midpoint of the price range, deliberately not the mean of closes.
        self.average_price = ((self.min_price + self.max_price) / Decimal::TWO).round_dp(4);
        self.x0 = last.close.round_dp(4);
        self.trend = if self.x0 > self.average_price {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        };
        self.invalid = !self.is_contiguous();
    }

    fn is_contiguous(&self) -> bool {
        self.points_data
            .windows(2)
            .all(|w| (w[1].ts - w[0].ts).num_seconds() == 60)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.segment_start && ts <= self.segment_end
    }

    /// Whether `[segment_start, segment_end]` intersects the closed range
    /// `[start, end]`.
    pub fn span_intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.segment_start <= end && self.segment_end >= start
    }

    pub fn has_feedback(&self) -> bool {
        self.is_result_correct.is_some()
            || self.result_interval.is_some()
            || self.result.is_some()
    }

    /// Appends one trial: one token to each of the three parallel lists,
    /// creating them on first use.
    pub fn append_feedback_trial(&mut self, is_correct: f64, interval_minutes: f64, result: f64) {
        push_token(&mut self.is_result_correct, is_correct);
        push_token(&mut self.result_interval, interval_minutes);
        push_token(&mut self.result, result);
    }
}

fn push_token(list: &mut Option<String>, value: f64) {
    match list {
        Some(s) => {
            s.push(' ');
            s.push_str(&value.to_string());
        }
        None => *list = Some(value.to_string()),
    }
}

/// Stable content-derived id: hex of the first 16 bytes of a SHA-256 over
/// the pipe-joined parts.
pub fn deterministic_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn minute_candles(start: DateTime<Utc>, closes: &[&str]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| {
                let close: Decimal = close.parse().unwrap();
                Candle {
                    ts: start + chrono::Duration::minutes(i as i64),
                    open: close - dec!(0.2),
                    high: close + dec!(0.5),
                    low: close - dec!(0.5),
                    close,
                    volume: dec!(1000),
                }
            })
            .collect()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap()
    }

    #[test]
    fn derived_stats_use_midpoint_not_mean() {
        let points = minute_candles(start(), &["10", "11", "12", "13", "14", "20"]);
        let seg = AnalysisSegment::from_points("SPY", "stream-1", points).unwrap();
        // lows run 9.5..19.5, highs 10.5..20.5
        assert_eq!(seg.min_price, dec!(9.5));
        assert_eq!(seg.max_price, dec!(20.5));
        // midpoint of the range, NOT the mean of the closes (which is 13.33..)
        assert_eq!(seg.average_price, dec!(15.0));
        assert_eq!(seg.average_price, (seg.min_price + seg.max_price) / Decimal::TWO);
        assert_eq!(seg.x0, dec!(20));
        assert_eq!(seg.trend, TrendDirection::Up);
        assert!(seg.min_price <= seg.average_price && seg.average_price <= seg.max_price);
    }

    #[test]
    fn trend_down_when_last_close_at_or_below_midpoint() {
        let points = minute_candles(start(), &["20", "11", "12", "13", "14", "10"]);
        let seg = AnalysisSegment::from_points("SPY", "stream-1", points).unwrap();
        assert_eq!(seg.trend, TrendDirection::Down);
    }

    #[test]
    fn ids_are_deterministic_and_distinct() {
        let points = minute_candles(start(), &["10", "11", "12", "13", "14", "15"]);
        let a = AnalysisSegment::from_points("SPY", "s1", points.clone()).unwrap();
        let b = AnalysisSegment::from_points("SPY", "s2", points.clone()).unwrap();
        let c = AnalysisSegment::from_points("QQQ", "s1", points).unwrap();
        // same symbol and window: same id regardless of stream
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn contiguous_window_is_valid_gap_is_flagged() {
        let mut points = minute_candles(start(), &["10", "11", "12", "13", "14", "15", "16"]);
        let seg = AnalysisSegment::from_points("SPY", "s1", points.clone()).unwrap();
        assert!(!seg.invalid);

        // punch a hole in the middle, as truncation can
        points.remove(3);
        let seg = AnalysisSegment::from_points("SPY", "s1", points).unwrap();
        assert!(seg.invalid);
    }

    #[test]
    fn feedback_trial_appends_to_all_three_lists() {
        let points = minute_candles(start(), &["10", "11", "12", "13", "14", "15"]);
        let mut seg = AnalysisSegment::from_points("SPY", "s1", points).unwrap();
        assert!(!seg.has_feedback());

        seg.append_feedback_trial(1.0, 10.0, 0.5);
        seg.append_feedback_trial(0.0, 5.0, -0.25);
        assert_eq!(seg.is_result_correct.as_deref(), Some("1 0"));
        assert_eq!(seg.result_interval.as_deref(), Some("10 5"));
        assert_eq!(seg.result.as_deref(), Some("0.5 -0.25"));
    }

    #[test]
    fn stats_round_to_four_decimals() {
        let points = minute_candles(start(), &["10.00005", "10.00015", "10.00025", "10.00035", "10.00045", "10.00055"]);
        let seg = AnalysisSegment::from_points("SPY", "s1", points).unwrap();
        assert!(seg.min_price.scale() <= 4);
        assert!(seg.max_price.scale() <= 4);
        assert!(seg.average_price.scale() <= 4);
        assert!(seg.x0.scale() <= 4);
    }
}
