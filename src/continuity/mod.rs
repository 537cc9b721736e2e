//! One-minute-cadence contract check, run before anything is persisted.
//!
//! A series fails on the first offending consecutive pair; there is no
//! partial acceptance. Jumps across a UTC calendar date boundary are fine
//! (a session may open at any minute), gaps within a day are not.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContinuityError {
    #[error("duplicate timestamp {at}")]
    Duplicate { at: DateTime<Utc> },
    #[error("out-of-order timestamps: {prev} followed by {next}")]
    OutOfOrder {
        prev: DateTime<Utc>,
        next: DateTime<Utc>,
    },
    #[error("intraday gap of {gap_minutes} minutes between {prev} and {next}")]
    IntradayGap {
        prev: DateTime<Utc>,
        next: DateTime<Utc>,
        gap_minutes: i64,
    },
    #[error("timestamps off the minute grid: {prev} followed by {next} ({gap_seconds}s apart)")]
    Misaligned {
        prev: DateTime<Utc>,
        next: DateTime<Utc>,
        gap_seconds: i64,
    },
}

/// Validates the timestamp list of a raw series in its as-uploaded order.
/// Pure; no side effects. Empty and single-element series are trivially
/// valid.
pub fn check(timestamps: &[DateTime<Utc>]) -> Result<(), ContinuityError> {
    for pair in timestamps.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let delta_seconds = (next - prev).num_seconds();

        if delta_seconds == 0 {
            return Err(ContinuityError::Duplicate { at: next });
        }
        if delta_seconds < 0 {
            return Err(ContinuityError::OutOfOrder { prev, next });
        }
        if delta_seconds == 60 {
            continue;
        }
        // A new trading day may start at any minute.
        if prev.date_naive() != next.date_naive() {
            continue;
        }
        // A sub-minute or fractional delta would truncate to a misleading
        // whole-minute gap; report it in seconds instead.
        if delta_seconds % 60 != 0 {
            return Err(ContinuityError::Misaligned {
                prev,
                next,
                gap_seconds: delta_seconds,
            });
        }
        return Err(ContinuityError::IntradayGap {
            prev,
            next,
            gap_minutes: delta_seconds / 60,
        });
    }
    Ok(())
}
