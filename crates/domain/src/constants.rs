//! Calendar engine constants
//!
//! Centralized location for the fixed values shared by the core services and
//! the adapters.

use chrono::Duration;

/// Integration-key prefix for Google calendar tasks and categories.
pub const GOOGLE_INTEGRATION_PREFIX: &str = "gcal";

/// Workspace that groups calendar categories when calendars are merged.
pub const DEFAULT_CALENDAR_WORKSPACE: &str = "📅 Google Calendar";

/// Access tokens expiring within this many seconds are refreshed first.
pub const TOKEN_REFRESH_SKEW_SECS: i64 = 300;

// Task payload defaults for converted events
pub const CALENDAR_TASK_PRIORITY: i32 = 2;
pub const CALENDAR_TASK_VALUE: f64 = 5.0;

// Reminder offsets for timed events
pub const REMINDER_BEFORE_START_MINS: i64 = 30;
pub const REMINDER_BEFORE_END_MINS: i64 = 15;

/// Default half-width of the events/sync window when the caller omits bounds.
pub const DEFAULT_EVENT_WINDOW_DAYS: i64 = 2;

/// Webhook-triggered syncs cover today plus this many days.
pub const WEBHOOK_SYNC_DAYS_AHEAD: i64 = 7;

/// Watch channels expiring within this window are renewed.
pub const WATCH_RENEWAL_LOOKAHEAD_HOURS: i64 = 72;

// Webhook rate limiting (per connection id)
pub const WEBHOOK_MAX_REQUESTS: u32 = 10;
pub const WEBHOOK_WINDOW_SECS: u64 = 60;
pub const RATE_LIMIT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Refresh skew as a chrono duration.
pub fn token_refresh_skew() -> Duration {
    Duration::seconds(TOKEN_REFRESH_SKEW_SECS)
}
