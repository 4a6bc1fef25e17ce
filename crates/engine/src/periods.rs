use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

/// Truncate an instant to the start of its hour.
pub fn hour_floor(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(t)
}

/// Hour-aligned period starts in `[from, to)` that are not in `calculated`.
pub fn missing_period_starts(
    calculated: &[DateTime<Utc>],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let done: HashSet<i64> = calculated.iter().map(|t| t.timestamp()).collect();

    let mut missing = Vec::new();
    let mut current = hour_floor(from);
    let end = hour_floor(to);

    while current < end {
        if !done.contains(&current.timestamp()) {
            missing.push(current);
        }
        current += Duration::hours(1);
    }

    missing
}
