use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};

/// Whole minutes from `earlier` to `later`, clamped at zero.
pub fn minutes_since(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - earlier).num_minutes().max(0)
}

/// Combines a service date and a local-clock time into the instant used for
/// slot and ride scheduling. The service operates on a single clock, so the
/// naive combination is interpreted as UTC throughout.
pub fn instant_on(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

/// Hour-of-day bucket a timestamp falls into.
pub fn hour_of(at: DateTime<Utc>) -> u32 {
    at.time().hour()
}
