//! Overlap reconciliation: when freshly fetched data duplicates part of a
//! symbol's history, previously persisted segments shrink or disappear so
//! that no timestamp is ever owned by two segments.
//!
//! This module only plans; committing the plan against the store is the
//! engine's job (truncations and deletions go first, new segments after).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::types::{AnalysisSegment, Candle, RawSeries};

/// Outcome of planning one new series against the persisted segment set.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// Genuinely new points, not covered by any existing segment.
    pub points_to_persist: Vec<Candle>,
    /// Surviving truncated segments, stats and bounds recomputed.
    pub updated_segments: Vec<AnalysisSegment>,
    /// Segments left with fewer than the minimum points after truncation.
    pub deleted_segment_ids: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.points_to_persist.is_empty()
    }

    /// Shrunk + deleted count, reported for observability only.
    pub fn segments_affected(&self) -> usize {
        self.updated_segments.len() + self.deleted_segment_ids.len()
    }
}

/// Plans reconciliation of `series` against `existing` segments of the same
/// symbol. Pure; the inputs are snapshots.
///
/// Timestamps already covered by a segment's payload are discarded. If
/// nothing new remains the plan is a no-op and nothing is truncated, which
/// is exactly what makes re-uploading the same file idempotent. Otherwise
/// every segment whose span intersects the range of the GENUINELY NEW
/// points drops its points inside that range; remnants below `min_points`
/// are deleted. The range deliberately excludes the discarded duplicates:
/// re-uploading a file whose tail never made it into a segment yields new
/// points only past every segment's end, and must leave those segments
/// alone.
pub fn plan(
    series: &RawSeries,
    existing: &[AnalysisSegment],
    min_points: usize,
) -> ReconcilePlan {
    let covered: BTreeSet<DateTime<Utc>> = existing
        .iter()
        .flat_map(|seg| seg.points_data.iter().map(|p| p.ts))
        .collect();

    let points_to_persist: Vec<Candle> = series
        .candles
        .iter()
        .filter(|c| !covered.contains(&c.ts))
        .cloned()
        .collect();

    let (new_start, new_end) = match (
        points_to_persist.iter().map(|c| c.ts).min(),
        points_to_persist.iter().map(|c| c.ts).max(),
    ) {
        (Some(start), Some(end)) => (start, end),
        _ => return ReconcilePlan::default(),
    };

    let mut updated_segments = Vec::new();
    let mut deleted_segment_ids = Vec::new();
    for seg in existing {
        if !seg.span_intersects(new_start, new_end) {
            continue;
        }
        let remaining: Vec<Candle> = seg
            .points_data
            .iter()
            .filter(|p| p.ts < new_start || p.ts > new_end)
            .cloned()
            .collect();
        if remaining.len() == seg.points_data.len() {
            continue;
        }
        if remaining.len() < min_points {
            deleted_segment_ids.push(seg.id.clone());
        } else {
            let mut survivor = seg.clone();
            survivor.points_data = remaining;
            survivor.recompute_derived();
            updated_segments.push(survivor);
        }
    }

    ReconcilePlan {
        points_to_persist,
        updated_segments,
        deleted_segment_ids,
    }
}
