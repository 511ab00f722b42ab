//! # Kindred Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The calendar connection, token, watch and sync services
//! - Port interfaces (traits) implemented by `kindred-infra`
//! - The event to task converter
//!
//! ## Architecture Principles
//! - Only depends on `kindred-common` and `kindred-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod calendar;

pub use calendar::ports::{
    CalendarProvider, ConnectionRepository, EventBatch, ProcessedEventLedger, TaskStore, Upserted,
};
pub use calendar::{
    ConnectionManager, ProviderRegistry, SyncOrchestrator, TokenLifecycleManager,
    WatchChannelManager, WebhookGatekeeper,
};
