//! # Kindred Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - Database implementations (SQLCipher via r2d2)
//! - The retrying HTTP client
//! - The Google Calendar provider and OAuth client
//! - Configuration loading and the watch renewal scheduler
//!
//! ## Architecture
//! - Implements traits defined in `kindred-core`
//! - Contains all "impure" code (I/O, network, SQL)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod scheduling;

// Re-export commonly used items
pub use database::*;
pub use errors::InfraError;
pub use http::*;
pub use integrations::*;
pub use scheduling::{WatchRenewalScheduler, WatchRenewalSchedulerConfig};
