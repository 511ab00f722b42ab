//! Time utilities and abstractions
//!
//! - **[`clock`]**: real and mock clocks so time-dependent logic is testable
//! - **[`window`]**: calendar-day bounds used to default sync ranges

pub mod clock;
pub mod window;

pub use clock::{Clock, MockClock, SystemClock};
pub use window::{days_ahead_window, end_of_day, start_of_day, symmetric_window};
