//! Shared test helpers for `kindred-core` integration tests.
//!
//! [`Harness`] wires every calendar service against in-memory ports and a
//! [`MockClock`] pinned to 2025-01-15 08:00 UTC.

#![allow(dead_code)]

pub mod provider;
pub mod repositories;

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use kindred_common::{Clock, MockClock};
use kindred_core::{
    ConnectionManager, ProviderRegistry, SyncOrchestrator, TokenLifecycleManager,
    WatchChannelManager,
};
use kindred_domain::{CalendarConnection, ProviderEvent};
use uuid::Uuid;

pub use provider::FakeProvider;
pub use repositories::{InMemoryConnections, InMemoryLedger, InMemoryTaskStore};

pub const WEBHOOK_BASE: &str = "https://hooks.example.com/v1/calendar/webhook";

pub struct Harness {
    pub clock: MockClock,
    pub provider: Arc<FakeProvider>,
    pub connections: Arc<InMemoryConnections>,
    pub tasks: Arc<InMemoryTaskStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub tokens: Arc<TokenLifecycleManager>,
    pub watches: Arc<WatchChannelManager>,
    pub manager: ConnectionManager,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap();
        let clock = MockClock::at_utc(start);
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

        let provider = Arc::new(FakeProvider::new(start));
        provider.set_calendars(vec![
            FakeProvider::calendar("primary", "Work"),
            FakeProvider::calendar("family@group.calendar.google.com", "Family"),
        ]);

        let registry = Arc::new(ProviderRegistry::new().with_provider(provider.clone()));
        let connections = Arc::new(InMemoryConnections::default());
        let tasks = Arc::new(InMemoryTaskStore::default());
        let ledger = Arc::new(InMemoryLedger::default());

        let tokens = Arc::new(TokenLifecycleManager::new(
            registry.clone(),
            connections.clone(),
            shared_clock.clone(),
        ));
        let watches = Arc::new(WatchChannelManager::new(
            registry.clone(),
            connections.clone(),
            tokens.clone(),
            shared_clock.clone(),
            WEBHOOK_BASE,
        ));
        let manager = ConnectionManager::new(
            registry.clone(),
            connections.clone(),
            tasks.clone(),
            ledger.clone(),
            tokens.clone(),
            watches.clone(),
            shared_clock.clone(),
        );
        let orchestrator = Arc::new(SyncOrchestrator::new(
            registry,
            connections.clone(),
            tasks.clone(),
            ledger.clone(),
            tokens.clone(),
            shared_clock,
        ));

        Self { clock, provider, connections, tasks, ledger, tokens, watches, manager, orchestrator }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc_now()
    }

    /// Run the OAuth callback for `user_id` and return the stored connection.
    pub async fn connect(&self, user_id: Uuid) -> CalendarConnection {
        self.manager
            .handle_callback("google", "auth-code", &user_id.to_string())
            .await
            .expect("callback should succeed")
    }

    /// Timed event on `calendar_id` starting `hours` from now, one hour long.
    pub fn event(&self, calendar_id: &str, id: &str, hours: i64) -> ProviderEvent {
        let start = self.now() + Duration::hours(hours);
        ProviderEvent {
            id: id.into(),
            calendar_id: calendar_id.into(),
            calendar_name: String::new(),
            summary: format!("Event {id}"),
            description: String::new(),
            location: String::new(),
            start: start.fixed_offset(),
            end: (start + Duration::hours(1)).fixed_offset(),
            is_all_day: false,
            attendees: Vec::new(),
            status: "confirmed".into(),
        }
    }

    /// All-day event on `date`, stored from UTC midnight to the next.
    pub fn all_day_event(&self, calendar_id: &str, id: &str, date: NaiveDate) -> ProviderEvent {
        let start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        ProviderEvent {
            start: start.fixed_offset(),
            end: (start + Duration::days(1)).fixed_offset(),
            is_all_day: true,
            ..self.event(calendar_id, id, 0)
        }
    }

    /// Window covering the whole test day and the next.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.now() - Duration::days(1), self.now() + Duration::days(2))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
