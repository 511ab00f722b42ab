//! Scheduling infrastructure for background maintenance jobs
//!
//! The watch renewal scheduler re-registers push channels before the
//! provider lets them lapse. Schedulers have an explicit start/stop
//! lifecycle, track their join handles and wrap every await in a timeout.

pub mod error;
pub mod watch_renewal_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use watch_renewal_scheduler::{WatchRenewalScheduler, WatchRenewalSchedulerConfig, WatchRenewer};
