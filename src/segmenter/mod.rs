//! Session slicing: partitions a validated series into per-day, fixed-size,
//! non-overlapping candidate segments with derived price stats.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::{AnalysisSegment, Candle, RawSeries};

/// Slices a continuity-validated series into candidate segments.
///
/// Within each UTC trading day the window advances by its own length, so
/// segments from a single pass never overlap. Windows shorter than
/// `min_segment_points` are dropped; at most `max_segments_per_day` are
/// emitted per day. The day-final partial window IS emitted when it still
/// holds at least `min_segment_points` bars, so a short session is not
/// thrown away wholesale.
pub fn slice(stream_id: &str, series: &RawSeries, config: &EngineConfig) -> Vec<AnalysisSegment> {
    let mut by_day: BTreeMap<NaiveDate, Vec<Candle>> = BTreeMap::new();
    for candle in &series.candles {
        by_day.entry(candle.trading_date()).or_default().push(candle.clone());
    }

    let mut segments = Vec::new();
    for (day, mut candles) in by_day {
        candles.sort_by_key(|c| c.ts);
        let mut emitted = 0usize;
        for window in candles.chunks(config.segment_window) {
            if emitted >= config.max_segments_per_day {
                debug!(
                    symbol = %series.symbol,
                    %day,
                    "per-day segment cap reached, remaining bars skipped"
                );
                break;
            }
            if window.len() < config.min_segment_points {
                continue;
            }
            if let Some(segment) =
                AnalysisSegment::from_points(&series.symbol, stream_id, window.to_vec())
            {
                segments.push(segment);
                emitted += 1;
            }
        }
    }
    segments
}
