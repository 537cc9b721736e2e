//! Boundary operations: ingest, classify, record feedback, score.
//!
//! The engine wires the pure components to the persistence port. Per-symbol
//! serialization is the caller's job; within one ingest the reconciler's
//! truncations and deletions commit before any new candidate segment is
//! written, so the overlap check can never run against a stale snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::config::EngineConfig;
use crate::continuity::{self, ContinuityError};
use crate::database::{SegmentStore, StoreError};
use crate::reconcile;
use crate::scoring;
use crate::segmenter;
use crate::types::{RawSeries, SchemaType, Stream, Trajectory};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal for the whole ingest batch; carries the offending pair.
    #[error(transparent)]
    Continuity(#[from] ContinuityError),
    #[error("segment not found: {0}")]
    SegmentNotFound(String),
    #[error("pattern point {point} outside segment span {start}..{end}")]
    PatternPointOutOfRange {
        point: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("feedback interval must be a finite number of minutes >= 0, got {interval}")]
    InvalidFeedbackInterval { segment_id: String, interval: f64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one ingest run did, for the caller and the logs.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub stream_id: Option<String>,
    pub points_persisted: usize,
    pub segments_created: Vec<String>,
    pub segments_updated: usize,
    pub segments_deleted: usize,
}

/// Classification update; `pattern_point` distinguishes "set", "clear" and
/// "leave alone".
#[derive(Debug, Clone, Default)]
pub struct ClassifyRequest {
    pub schema_type: Option<SchemaType>,
    pub pattern_point: Option<PatternPointUpdate>,
}

#[derive(Debug, Clone, Copy)]
pub enum PatternPointUpdate {
    Set(DateTime<Utc>),
    Clear,
}

pub struct Engine {
    store: Arc<dyn SegmentStore>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn SegmentStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Validates, reconciles and persists one raw series.
    ///
    /// A continuity violation rejects the whole batch. A fully duplicate
    /// series is a no-op, which makes re-uploads idempotent. Overlap
    /// conflicts are resolved by truncation/deletion and only logged.
    pub async fn ingest(&self, series: RawSeries) -> Result<IngestOutcome, EngineError> {
        continuity::check(&series.timestamps())?;

        let existing = self.store.segments_for_symbol(&series.symbol).await?;
        let plan = reconcile::plan(&series, &existing, self.config.min_segment_points);
        if plan.is_noop() {
            info!(symbol = %series.symbol, "all {} points already covered, nothing to ingest", series.len());
            return Ok(IngestOutcome::default());
        }

        if plan.segments_affected() > 0 {
            info!(
                symbol = %series.symbol,
                shrunk = plan.updated_segments.len(),
                deleted = plan.deleted_segment_ids.len(),
                "overlap with existing segments resolved"
            );
        }
        // Truncations commit before anything new, so the snapshot the plan
        // was computed from stays authoritative.
        for seg in &plan.updated_segments {
            self.store.update_segment(seg).await?;
        }
        for id in &plan.deleted_segment_ids {
            self.store.delete_segment(id).await?;
        }

        let new_series = RawSeries::new(series.symbol.clone(), plan.points_to_persist.clone());
        let first = new_series.first_ts().expect("non-noop plan has points");
        let last = new_series.last_ts().expect("non-noop plan has points");
        let stream = Stream::new(&new_series.symbol, first, last, new_series.len());

        self.store.insert_points(&new_series.symbol, &new_series.candles).await?;
        self.store.insert_stream(&stream).await?;

        let segments = segmenter::slice(&stream.id, &new_series, &self.config);
        self.store.insert_segments(&segments).await?;

        info!(
            symbol = %new_series.symbol,
            stream = %stream.id,
            points = new_series.len(),
            segments = segments.len(),
            "ingest complete"
        );
        Ok(IngestOutcome {
            stream_id: Some(stream.id),
            points_persisted: new_series.len(),
            segments_created: segments.into_iter().map(|s| s.id).collect(),
            segments_updated: plan.updated_segments.len(),
            segments_deleted: plan.deleted_segment_ids.len(),
        })
    }

    /// Applies schema type and/or pattern point to one segment.
    pub async fn classify(
        &self,
        segment_id: &str,
        request: ClassifyRequest,
    ) -> Result<(), EngineError> {
        let mut segment = self
            .store
            .get_segment(segment_id)
            .await?
            .ok_or_else(|| EngineError::SegmentNotFound(segment_id.to_string()))?;

        if let Some(schema_type) = request.schema_type {
            segment.schema_type = schema_type;
        }
        match request.pattern_point {
            Some(PatternPointUpdate::Set(point)) => {
                if !segment.contains(point) {
                    return Err(EngineError::PatternPointOutOfRange {
                        point,
                        start: segment.segment_start,
                        end: segment.segment_end,
                    });
                }
                segment.pattern_point = Some(point);
            }
            Some(PatternPointUpdate::Clear) => segment.pattern_point = None,
            None => {}
        }

        self.store.update_segment(&segment).await?;
        Ok(())
    }

    /// Appends one feedback trial to a segment's three parallel lists.
    pub async fn record_feedback(
        &self,
        segment_id: &str,
        is_correct: f64,
        interval_minutes: f64,
        result: f64,
    ) -> Result<(), EngineError> {
        // A negative or non-finite interval would poison the trajectory
        // math downstream (ln of a non-positive operand); refuse it here.
        if !interval_minutes.is_finite() || interval_minutes < 0.0 {
            return Err(EngineError::InvalidFeedbackInterval {
                segment_id: segment_id.to_string(),
                interval: interval_minutes,
            });
        }
        let mut segment = self
            .store
            .get_segment(segment_id)
            .await?
            .ok_or_else(|| EngineError::SegmentNotFound(segment_id.to_string()))?;

        segment.append_feedback_trial(is_correct, interval_minutes, result);
        self.store.update_segment(&segment).await?;
        Ok(())
    }

    /// Scores a symbol's segments (optionally one stream's) into a
    /// trajectory. Read-only; callers wanting isolation from concurrent
    /// classification should snapshot-read first.
    pub async fn score_trajectory(
        &self,
        symbol: &str,
        stream_id: Option<&str>,
    ) -> Result<Trajectory, EngineError> {
        let segments = match stream_id {
            Some(stream_id) => self.store.segments_for_stream(symbol, stream_id).await?,
            None => self.store.segments_for_symbol(symbol).await?,
        };
        Ok(scoring::score(&segments, &self.config))
    }

    /// All persisted segments for a symbol, oldest first.
    pub async fn segments(&self, symbol: &str) -> Result<Vec<crate::types::AnalysisSegment>, EngineError> {
        Ok(self.store.segments_for_symbol(symbol).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    use crate::database::MemoryStore;
    use crate::types::Candle;

    fn minute_series(symbol: &str, start: DateTime<Utc>, n: usize) -> RawSeries {
        let candles = (0..n)
            .map(|i| {
                let price = dec!(100) + rust_decimal::Decimal::from(i % 5);
                Candle {
                    ts: start + Duration::minutes(i as i64),
                    open: price,
                    high: price + dec!(0.5),
                    low: price - dec!(0.5),
                    close: price,
                    volume: dec!(250),
                }
            })
            .collect();
        RawSeries::new(symbol, candles)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap()
    }

    fn small_engine() -> (Engine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig {
            segment_window: 10,
            min_segment_points: 6,
            max_segments_per_day: 6,
            ..EngineConfig::default()
        };
        (Engine::new(store.clone(), config), store)
    }

    #[tokio::test]
    async fn ingest_slices_and_persists() {
        let (engine, store) = small_engine();
        let outcome = engine.ingest(minute_series("SPY", t0(), 26)).await.unwrap();

        assert_eq!(outcome.points_persisted, 26);
        // two full windows plus the qualifying 6-bar tail
        assert_eq!(outcome.segments_created.len(), 3);
        assert!(outcome.stream_id.is_some());
        assert_eq!(store.point_count("SPY").await, 26);

        let segments = engine.segments("SPY").await.unwrap();
        assert_eq!(segments.len(), 3);
        for seg in &segments {
            assert!(seg.point_count >= 6);
            assert!(seg.segment_start < seg.segment_end);
            assert!(seg.min_price <= seg.average_price && seg.average_price <= seg.max_price);
        }
    }

    #[tokio::test]
    async fn continuity_violation_rejects_whole_batch() {
        let (engine, store) = small_engine();
        let mut series = minute_series("SPY", t0(), 12);
        series.candles.remove(5); // intraday gap

        let err = engine.ingest(series).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Continuity(ContinuityError::IntradayGap { gap_minutes: 2, .. })
        ));
        assert_eq!(store.point_count("SPY").await, 0);
        assert!(engine.segments("SPY").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reingesting_same_series_is_a_noop() {
        let (engine, store) = small_engine();
        engine.ingest(minute_series("SPY", t0(), 20)).await.unwrap();
        let ids_before: Vec<String> = engine
            .segments("SPY")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();

        let outcome = engine.ingest(minute_series("SPY", t0(), 20)).await.unwrap();
        assert!(outcome.stream_id.is_none());
        assert_eq!(outcome.points_persisted, 0);

        let ids_after: Vec<String> = engine
            .segments("SPY")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids_before, ids_after);
        assert_eq!(store.point_count("SPY").await, 20);
        assert_eq!(store.stream_count().await, 1);
    }

    #[tokio::test]
    async fn overlapping_ingest_truncates_and_deletes() {
        let (engine, _) = small_engine();
        // first batch: 10-bar window + 10-bar window
        engine.ingest(minute_series("SPY", t0(), 20)).await.unwrap();

        // second batch straddles the whole history: 5 bars before, the 20
        // duplicates, 6 bars after. The 11 new bars bracket both segments.
        let outcome = engine
            .ingest(minute_series("SPY", t0() - Duration::minutes(5), 31))
            .await
            .unwrap();
        assert_eq!(outcome.points_persisted, 11);
        // both original segments sit inside the new points' range and lose
        // every bar, so both fall under the floor and are deleted
        assert_eq!(outcome.segments_deleted, 2);
        assert_eq!(outcome.segments_updated, 0);
        // the 11 new bars re-segment into one 10-bar window (1-bar rest
        // dropped); it has a 20-minute hole, so it carries the invalid flag
        assert_eq!(outcome.segments_created.len(), 1);

        let segments = engine.segments("SPY").await.unwrap();
        assert_eq!(segments.len(), 1);
        assert!(segments[0].invalid);

        // no timestamp owned by two segments
        let mut owned: Vec<DateTime<Utc>> = segments
            .iter()
            .flat_map(|s| s.points_data.iter().map(|p| p.ts))
            .collect();
        let before = owned.len();
        owned.sort();
        owned.dedup();
        assert_eq!(before, owned.len());
    }

    #[tokio::test]
    async fn reingesting_file_with_unsegmented_tail_keeps_segments() {
        let (engine, _) = small_engine();
        // 25 bars: two 10-bar windows, 5-bar tail under the 6-point floor
        let outcome = engine.ingest(minute_series("SPY", t0(), 25)).await.unwrap();
        assert_eq!(outcome.segments_created.len(), 2);
        let ids_before: Vec<String> = engine
            .segments("SPY")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();

        // the identical file again: only the unowned tail comes back as
        // new, and it must not truncate the segments it trails behind
        let outcome = engine.ingest(minute_series("SPY", t0(), 25)).await.unwrap();
        assert_eq!(outcome.points_persisted, 5);
        assert_eq!(outcome.segments_updated, 0);
        assert_eq!(outcome.segments_deleted, 0);
        assert!(outcome.segments_created.is_empty());

        let ids_after: Vec<String> = engine
            .segments("SPY")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids_before, ids_after);
    }

    #[tokio::test]
    async fn out_of_order_upload_is_rejected_as_given() {
        let (engine, store) = small_engine();
        let mut series = minute_series("SPY", t0(), 12);
        series.candles.swap(0, 1);

        let err = engine.ingest(series).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Continuity(ContinuityError::OutOfOrder { prev, next })
                if prev == t0() + Duration::minutes(1) && next == t0()
        ));
        assert_eq!(store.point_count("SPY").await, 0);
        assert!(engine.segments("SPY").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn classify_and_pattern_point_bounds() {
        let (engine, _) = small_engine();
        let outcome = engine.ingest(minute_series("SPY", t0(), 10)).await.unwrap();
        let id = &outcome.segments_created[0];

        engine
            .classify(
                id,
                ClassifyRequest {
                    schema_type: Some(SchemaType::V),
                    pattern_point: Some(PatternPointUpdate::Set(t0() + Duration::minutes(3))),
                },
            )
            .await
            .unwrap();
        let seg = engine.segments("SPY").await.unwrap().remove(0);
        assert_eq!(seg.schema_type, SchemaType::V);
        assert_eq!(seg.pattern_point, Some(t0() + Duration::minutes(3)));

        let err = engine
            .classify(
                id,
                ClassifyRequest {
                    schema_type: None,
                    pattern_point: Some(PatternPointUpdate::Set(t0() + Duration::hours(2))),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PatternPointOutOfRange { .. }));

        engine
            .classify(
                id,
                ClassifyRequest {
                    schema_type: None,
                    pattern_point: Some(PatternPointUpdate::Clear),
                },
            )
            .await
            .unwrap();
        let seg = engine.segments("SPY").await.unwrap().remove(0);
        assert_eq!(seg.pattern_point, None);
    }

    #[tokio::test]
    async fn unknown_segment_is_not_found() {
        let (engine, _) = small_engine();
        let err = engine
            .classify("missing", ClassifyRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SegmentNotFound(_)));

        let err = engine
            .record_feedback("missing", 1.0, 10.0, 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SegmentNotFound(_)));
    }

    #[tokio::test]
    async fn negative_or_non_finite_interval_is_rejected() {
        let (engine, _) = small_engine();
        let outcome = engine.ingest(minute_series("SPY", t0(), 10)).await.unwrap();
        let id = &outcome.segments_created[0];

        for bad in [-5.0, f64::NAN, f64::INFINITY] {
            let err = engine.record_feedback(id, 1.0, bad, 0.5).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidFeedbackInterval { .. }));
        }

        // nothing was appended
        let seg = engine.segments("SPY").await.unwrap().remove(0);
        assert!(!seg.has_feedback());

        // zero is a legitimate instantaneous trial
        engine.record_feedback(id, 1.0, 0.0, 0.5).await.unwrap();
        let seg = engine.segments("SPY").await.unwrap().remove(0);
        assert!(seg.has_feedback());
    }

    #[tokio::test]
    async fn feedback_then_trajectory_end_to_end() {
        let (engine, _) = small_engine();
        let outcome = engine.ingest(minute_series("SPY", t0(), 20)).await.unwrap();
        assert_eq!(outcome.segments_created.len(), 2);

        let segments = engine.segments("SPY").await.unwrap();
        engine
            .record_feedback(&segments[0].id, 1.0, 10.0, 2.0)
            .await
            .unwrap();
        engine
            .record_feedback(&segments[1].id, 0.0, 5.0, 0.5)
            .await
            .unwrap();

        let trajectory = engine.score_trajectory("SPY", None).await.unwrap();
        assert_eq!(trajectory.segments_scored, 2);
        assert_eq!(trajectory.points.len(), 4);
        assert_eq!(trajectory.success_rate, 50.0);
        // the documented single-trial shape for the first segment
        assert_eq!(trajectory.points[0].value, 0.0);
        assert!((trajectory.points[1].value - 2.0 * 11.0_f64.ln()).abs() < 1e-12);

        // stream filter: all segments came from the one stream
        let stream_id = outcome.stream_id.unwrap();
        let filtered = engine.score_trajectory("SPY", Some(&stream_id)).await.unwrap();
        assert_eq!(filtered.segments_scored, 2);
        assert!(engine
            .score_trajectory("SPY", Some("no-such-stream"))
            .await
            .unwrap()
            .points
            .is_empty());
    }
}
