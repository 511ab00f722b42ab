//! Calendar-day bounds

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

/// Midnight at the start of the day containing `at`, in `at`'s timezone.
pub fn start_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    let naive = at.date_naive().and_time(NaiveTime::MIN);
    at.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| at.clone())
}

/// Last whole second of the day containing `at`.
pub fn end_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    start_of_day(at) + Duration::days(1) - Duration::seconds(1)
}

/// `[now - days, now + days]`.
pub fn symmetric_window(now: DateTime<Utc>, days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - Duration::days(days), now + Duration::days(days))
}

/// From the start of today to the end of the day `days` ahead.
pub fn days_ahead_window(now: DateTime<Utc>, days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_day(&now);
    (start, end_of_day(&(start + Duration::days(days))))
}
