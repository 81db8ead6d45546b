//! Eligibility window - which candidate positions may write, and when.
//!
//! The newest passcode holder writes alone for five days. After that, older
//! holders regain the right one position at a time, until on day ten every
//! candidate (genesis included) is eligible. This keeps the chain from
//! stalling when the newest holder never returns.

use chrono::{DateTime, Utc};

use crate::types::{Position, CANDIDATE_COUNT};

/// Seconds in one whole day
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days after the last write at which each position becomes eligible.
///
/// | days  | eligible positions |
/// |-------|--------------------|
/// | 0-4   | 0                  |
/// | 5-6   | 0-1                |
/// | 7-8   | 0-2                |
/// | 9     | 0-3                |
/// | >= 10 | 0-4                |
const OPENS_AFTER_DAYS: [i64; CANDIDATE_COUNT] = [0, 5, 7, 9, 10];

/// Is a holder at `position` allowed to write `days_since` days after the last write?
pub fn is_eligible(days_since: i64, position: Position) -> bool {
    days_since >= opens_after(position)
}

/// Day on which `position` becomes eligible.
pub fn opens_after(position: Position) -> i64 {
    OPENS_AFTER_DAYS[position.index()]
}

/// Days still to wait before `position` may write; 0 when already eligible.
pub fn days_until_open(days_since: i64, position: Position) -> i64 {
    (opens_after(position) - days_since).max(0)
}

/// Whole days between two instants, floored. Not calendar-aware.
///
/// A `last` in the future (clock skew) counts as zero days.
pub fn days_between(last: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last).num_seconds().max(0) / SECONDS_PER_DAY
}
