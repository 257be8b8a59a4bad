use crate::models::TimeWindow;
use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// UTC calendar day containing `now`, as `[00:00:00, +24h)`
pub fn day_window(now: DateTime<Utc>) -> TimeWindow {
    let start = now.timestamp().div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY;
    TimeWindow {
        start,
        end: start + SECONDS_PER_DAY,
    }
}
