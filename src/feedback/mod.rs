//! The one place feedback lists are parsed.
//!
//! A segment carries three parallel space-separated numeric lists: the
//! correctness values, the trial intervals in minutes, and the signed
//! result magnitudes. Historical rows drift — lists of different lengths,
//! stray tokens — so parsing is lossy and normalization pads every list to
//! the longest one by repeating its own first element.

use crate::types::AnalysisSegment;

/// Result magnitudes are produced normalized to [-1, 1]; a magnitude at or
/// above this (and still in band) flags the whole segment as high-intensity
/// for coloring.
pub const HIGH_RESULT_BAND_START: f64 = 0.9;
pub const HIGH_RESULT_BAND_END: f64 = 1.0;

/// Normalized, equal-length trial lists for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackTrials {
    pub is_correct: Vec<f64>,
    pub interval: Vec<f64>,
    pub result: Vec<f64>,
}

impl FeedbackTrials {
    pub fn len(&self) -> usize {
        self.is_correct.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.is_correct.is_empty()
    }

    /// Revised correctness semantics: a trial is correct iff its
    /// correctness value is non-zero.
    pub fn trial_correct(&self, i: usize) -> bool {
        self.is_correct[i] != 0.0
    }

    /// A segment is correct overall when ANY of its trials is correct —
    /// an OR over trials, not an AND.
    pub fn any_correct(&self) -> bool {
        (0..self.len()).any(|i| self.trial_correct(i))
    }

    /// Stricter predicate for the high-intensity statistic: any trial whose
    /// correctness value reaches `threshold`.
    pub fn any_correct_at_least(&self, threshold: f64) -> bool {
        self.is_correct.iter().any(|c| *c >= threshold)
    }

    /// Whether any trial's |result| sits in the normalized high band. The
    /// band is closed at both ends: a full-magnitude result of 1 is the
    /// strongest signal there is and belongs in it.
    pub fn any_high_result(&self) -> bool {
        self.result.iter().any(|r| {
            let m = r.abs();
            (HIGH_RESULT_BAND_START..=HIGH_RESULT_BAND_END).contains(&m)
        })
    }
}

/// Whitespace-splits and numeric-parses one raw list, dropping unparsable
/// and non-finite tokens.
pub fn parse_list(raw: &str) -> Vec<f64> {
    raw.split_whitespace()
        .filter_map(|tok| tok.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect()
}

/// Parses and normalizes a segment's three lists. Returns `None` when any
/// list is missing or empty after parsing; such segments are skipped by the
/// scorer rather than failing it.
pub fn parse_segment_feedback(segment: &AnalysisSegment) -> Option<FeedbackTrials> {
    let is_correct = parse_list(segment.is_result_correct.as_deref()?);
    let interval = parse_list(segment.result_interval.as_deref()?);
    let result = parse_list(segment.result.as_deref()?);
    if is_correct.is_empty() || interval.is_empty() || result.is_empty() {
        return None;
    }

    let n = is_correct.len().max(interval.len()).max(result.len());
    let mut trials = FeedbackTrials {
        is_correct,
        interval,
        result,
    };
    pad_with_first(&mut trials.is_correct, n);
    pad_with_first(&mut trials.interval, n);
    pad_with_first(&mut trials.result, n);
    Some(trials)
}

fn pad_with_first(list: &mut Vec<f64>, n: usize) {
    let first = list[0];
    while list.len() < n {
        list.push(first);
    }
}

/// Legacy correctness predicate (every trial >= 0.5), retained only so
/// migrated rows can be cross-checked against the revised semantics.
#[allow(dead_code)]
pub fn legacy_all_correct(is_correct: &[f64]) -> bool {
    !is_correct.is_empty() && is_correct.iter().all(|c| *c >= 0.5)
}
