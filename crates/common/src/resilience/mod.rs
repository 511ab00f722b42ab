//! Resilience patterns for inbound traffic
//!
//! - **Fixed-window rate limiter**: per-key request admission with a
//!   background sweep that bounds memory
//!
//! Time is read through [`crate::time::Clock`] so tests drive windows with
//! `MockClock` instead of sleeping.

pub mod rate_limiter;

pub use rate_limiter::{FixedWindowConfig, FixedWindowRateLimiter, RateLimiterError, WindowStats};
