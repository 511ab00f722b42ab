//! Domain types for calendar connections, provider data and sync payloads

pub mod calendar;
pub mod sync;
pub mod task;

pub use calendar::*;
pub use sync::*;
pub use task::*;
