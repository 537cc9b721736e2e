//! Trajectory scoring: folds classified, feedback-bearing segments into one
//! continuous scored polyline plus aggregate success rates.
//!
//! The fold is read-only over its inputs and total over arbitrary persisted
//! data: segments without parseable feedback are skipped, never fatal.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::EngineConfig;
use crate::feedback::{self, FeedbackTrials};
use crate::types::{AnalysisSegment, PointColor, Trajectory, TrajectoryPoint};

struct PrevSegment {
    start_y: f64,
    correct: bool,
    actual_end_time: DateTime<Utc>,
}

/// Scores a chronologically ordered slice of segments.
///
/// Each trial contributes two points (its sub-interval start and end) with a
/// vertical advance of `result * ln(interval + 1)` — logarithmic dampening
/// so long intervals do not dominate linearly. An incorrect segment leaves
/// the running score untouched and forces the NEXT segment to branch back to
/// the incorrect segment's own start value, which renders as a visible
/// discontinuity. Times chain through each segment's actual end (after all
/// of its trial advances), not its nominal bound.
pub fn score(segments: &[AnalysisSegment], config: &EngineConfig) -> Trajectory {
    let mut points = Vec::new();
    let mut current_y = 0.0_f64;
    let mut prev: Option<PrevSegment> = None;

    let mut scored = 0usize;
    let mut correct_count = 0usize;
    let mut high_intensity_count = 0usize;

    for segment in segments {
        let Some(trials) = feedback::parse_segment_feedback(segment) else {
            if segment.has_feedback() {
                debug!(segment_id = %segment.id, "malformed feedback, segment skipped");
            }
            continue;
        };
        scored += 1;

        let correct = trials.any_correct();
        if correct {
            correct_count += 1;
        }
        if trials.any_correct_at_least(config.high_intensity_threshold) {
            high_intensity_count += 1;
        }

        let start_y = match &prev {
            // The very first scored segment starts at zero.
            None => 0.0,
            // Continuous: pick up where the running score stands.
            Some(p) if p.correct => current_y,
            // Branch back: restart from the failed segment's own start.
            Some(p) => p.start_y,
        };
        let start_time = match &prev {
            None => segment.segment_end,
            Some(p) => p.actual_end_time,
        };

        let (end_y, actual_end_time) =
            walk_trials(&mut points, segment, &trials, start_y, start_time);

        if correct {
            current_y = end_y;
        }
        prev = Some(PrevSegment {
            start_y,
            correct,
            actual_end_time,
        });
    }

    let (success_rate, high_intensity_success_rate) = if scored == 0 {
        (0.0, 0.0)
    } else {
        (
            correct_count as f64 / scored as f64 * 100.0,
            high_intensity_count as f64 / scored as f64 * 100.0,
        )
    };

    Trajectory {
        points,
        segments_scored: scored,
        success_rate,
        high_intensity_success_rate,
    }
}

/// Emits the 2·n points of one segment's trials, returning the ending value
/// and the actual end time.
fn walk_trials(
    points: &mut Vec<TrajectoryPoint>,
    segment: &AnalysisSegment,
    trials: &FeedbackTrials,
    start_y: f64,
    start_time: DateTime<Utc>,
) -> (f64, DateTime<Utc>) {
    let n = trials.len();
    let segment_high_intensity = trials.any_high_result();

    let mut y = start_y;
    let mut t = start_time;
    for i in 0..n {
        let color = if !trials.trial_correct(i) {
            PointColor::Black
        } else if segment_high_intensity {
            PointColor::Purple
        } else {
            PointColor::Red
        };
        // The ingest boundary refuses negative intervals, but rows written
        // by other tooling can still carry them; ln over a non-positive
        // operand would leak NaN into every value downstream. Treat such a
        // trial as instantaneous.
        let interval = trials.interval[i].max(0.0);
        let duration = Duration::milliseconds((interval * 60_000.0) as i64);
        let weighted_delta = trials.result[i] * (interval + 1.0).ln();

        points.push(TrajectoryPoint {
            time: t,
            value: y,
            color,
            is_extremity: i == 0,
            segment_id: segment.id.clone(),
        });
        t += duration;
        y += weighted_delta;
        points.push(TrajectoryPoint {
            time: t,
            value: y,
            color,
            is_extremity: i == n - 1,
            segment_id: segment.id.clone(),
        });
    }
    (y, t)
}
