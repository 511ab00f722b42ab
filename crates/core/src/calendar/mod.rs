//! Calendar connection and synchronization engine

pub mod connection;
pub mod converter;
pub mod ports;
pub mod providers;
pub mod sync;
pub mod token;
pub mod watch;
pub mod webhook;

pub use connection::ConnectionManager;
pub use converter::{convert_event, event_notes};
pub use ports::{
    CalendarProvider, ConnectionRepository, EventBatch, ProcessedEventLedger, TaskStore, Upserted,
};
pub use providers::ProviderRegistry;
pub use sync::SyncOrchestrator;
pub use token::TokenLifecycleManager;
pub use watch::WatchChannelManager;
pub use webhook::{ResourceState, WebhookGatekeeper, WebhookNotification, WebhookOutcome};
