//! Integration tests for the `time` module.
//!
//! Covers the mock clock shared through `Arc<dyn Clock>` and the default
//! sync windows derived from it.

#![cfg(feature = "foundation")]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use kindred_common::time::{days_ahead_window, symmetric_window, Clock, MockClock};

/// Code holding an `Arc<dyn Clock>` observes advances made on the test's handle.
#[test]
fn shared_mock_clock_moves_for_every_holder() {
    let start = Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap();
    let clock = MockClock::at_utc(start);
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());

    clock.advance_secs(90 * 60);

    assert_eq!(shared.utc_now(), start + Duration::minutes(90));
}

/// The webhook window starts at midnight and ends on the last second of the
/// seventh day; the events window is centred on now.
#[test]
fn sync_windows_from_a_mock_clock() {
    let clock = MockClock::at_utc(Utc.with_ymd_and_hms(2025, 3, 30, 22, 45, 10).unwrap());
    let now = clock.utc_now();

    let (from, to) = days_ahead_window(now, 7);
    assert_eq!(from, Utc.with_ymd_and_hms(2025, 3, 30, 0, 0, 0).unwrap());
    assert_eq!(to, Utc.with_ymd_and_hms(2025, 4, 6, 23, 59, 59).unwrap());

    let (from, to) = symmetric_window(now, 2);
    assert_eq!(to - from, Duration::days(4));
    assert_eq!(from, Utc.with_ymd_and_hms(2025, 3, 28, 22, 45, 10).unwrap());
}
