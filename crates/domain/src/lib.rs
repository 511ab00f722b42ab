//! # Kindred Domain
//!
//! Business domain types for the Kindred calendar engine.
//!
//! This crate contains:
//! - Calendar connection, watch channel and event types
//! - Task and category payloads produced by calendar sync
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other Kindred crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
