//! Modular common utilities shared across Kindred crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: clock abstraction and calendar-day windows
//! - `runtime`: rate limiting with background maintenance tasks
//! - `test-utils`: everything tests need (`MockClock` is always available)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod time;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use resilience::{FixedWindowConfig, FixedWindowRateLimiter, RateLimiterError, WindowStats};
#[cfg(feature = "foundation")]
pub use time::{Clock, MockClock, SystemClock};
