//! Calendar to task synchronization

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use kindred_common::Clock;
use kindred_domain::constants::DEFAULT_CALENDAR_WORKSPACE;
use kindred_domain::{
    calendar_integration_key, event_integration_key, CalendarConnection, CalendarError,
    KindredError, ProcessedEvent, ProviderEvent, Result, SyncResult,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::converter::convert_event;
use super::ports::{ConnectionRepository, EventBatch, ProcessedEventLedger, TaskStore};
use super::providers::ProviderRegistry;
use super::token::TokenLifecycleManager;

/// Pulls remote events and writes them as tasks.
///
/// Safe to run concurrently for one connection: duplicate tasks are rejected
/// by the task store and counted as skipped.
pub struct SyncOrchestrator {
    providers: Arc<ProviderRegistry>,
    connections: Arc<dyn ConnectionRepository>,
    tasks: Arc<dyn TaskStore>,
    ledger: Arc<dyn ProcessedEventLedger>,
    tokens: Arc<TokenLifecycleManager>,
    clock: Arc<dyn Clock>,
}

impl SyncOrchestrator {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        connections: Arc<dyn ConnectionRepository>,
        tasks: Arc<dyn TaskStore>,
        ledger: Arc<dyn ProcessedEventLedger>,
        tokens: Arc<TokenLifecycleManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { providers, connections, tasks, ledger, tokens, clock }
    }

    /// Events of every calendar of a connection owned by `user_id`.
    #[instrument(skip(self))]
    pub async fn fetch_events(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProviderEvent>> {
        let connection = self.load(connection_id, user_id).await?;
        let token = self.tokens.get_valid_token(&connection).await?;
        self.providers.get(connection.provider)?.fetch_events(&token, from, to).await
    }

    /// Fetch events in `[from, to]` and create one task per event.
    ///
    /// Calendars without a mirrored category are skipped. Tasks created by
    /// earlier runs whose event has disappeared from the window are deleted.
    #[instrument(skip(self))]
    pub async fn sync_events_to_tasks(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<SyncResult> {
        let connection = self.load(connection_id, user_id).await?;
        let token = self.tokens.get_valid_token(&connection).await?;
        let batch = self
            .providers
            .get(connection.provider)?
            .fetch_event_batch(&token, from, to)
            .await?;

        let outcome = self.write_tasks(&connection, &batch).await;
        self.stamp_last_sync(connection.id).await;
        let mut result = outcome?;

        result.tasks_deleted = self.reconcile_deletions(&connection, &batch, from, to).await;

        info!(
            created = result.tasks_created,
            skipped = result.tasks_skipped,
            deleted = result.tasks_deleted,
            total = result.events_total,
            "calendar sync complete"
        );
        Ok(result)
    }

    async fn load(&self, connection_id: Uuid, user_id: Uuid) -> Result<CalendarConnection> {
        self.connections
            .find_for_user(connection_id, user_id)
            .await?
            .ok_or_else(|| CalendarError::ConnectionNotFound(connection_id.to_string()).into())
    }

    async fn write_tasks(
        &self,
        connection: &CalendarConnection,
        batch: &EventBatch,
    ) -> Result<SyncResult> {
        let mut by_calendar: BTreeMap<&str, Vec<&ProviderEvent>> = BTreeMap::new();
        for event in &batch.events {
            by_calendar.entry(event.calendar_id.as_str()).or_default().push(event);
        }

        let mut result = SyncResult {
            events_total: batch.events.len(),
            workspace_name: DEFAULT_CALENDAR_WORKSPACE.to_string(),
            ..SyncResult::default()
        };

        for (calendar_id, events) in by_calendar {
            let key = calendar_integration_key(connection.id, calendar_id);
            let Some(category) =
                self.tasks.find_category_by_integration(connection.user_id, &key).await?
            else {
                debug!(
                    error = %CalendarError::CategoryNotFoundForCalendar(calendar_id.to_string()),
                    skipped = events.len(),
                    "skipping calendar"
                );
                result.tasks_skipped += events.len();
                continue;
            };

            let mut created = 0;
            for event in events {
                let now = self.clock.utc_now();
                let task = convert_event(event, connection.user_id, category.id, now);
                match self.tasks.insert_task(&task).await {
                    Ok(()) => {
                        created += 1;
                        self.record(connection, event, &task.integration, now).await;
                    }
                    Err(KindredError::Calendar(CalendarError::TaskWriteConflict(_))) => {
                        result.tasks_skipped += 1;
                    }
                    Err(err) => {
                        error!(integration = %task.integration, error = %err, "task write failed");
                        return Err(match err {
                            KindredError::Calendar(CalendarError::TaskWriteFailed(_)) => err,
                            other => CalendarError::TaskWriteFailed(other.to_string()).into(),
                        });
                    }
                }
            }
            result.tasks_created += created;
            *result.categories_synced.entry(category.name).or_default() += created;
        }

        Ok(result)
    }

    async fn record(
        &self,
        connection: &CalendarConnection,
        event: &ProviderEvent,
        integration: &str,
        now: DateTime<Utc>,
    ) {
        let entry = ProcessedEvent {
            connection_id: connection.id,
            user_id: connection.user_id,
            calendar_id: event.calendar_id.clone(),
            integration: integration.to_string(),
            event_start: event.start.with_timezone(&Utc),
            all_day: event.is_all_day,
            processed_at: now,
        };
        if let Err(err) = self.ledger.record(&entry).await {
            warn!(integration, error = %err, "failed to record processed event");
        }
    }

    /// Delete tasks whose event vanished remotely. Calendars that failed to
    /// load are left alone, as are entries the provider may have filtered
    /// out at the window edges. Errors are logged; returns tasks deleted.
    async fn reconcile_deletions(
        &self,
        connection: &CalendarConnection,
        batch: &EventBatch,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> usize {
        // The provider sees whole-second bounds.
        let (from, to) = (from.trunc_subsecs(0), to.trunc_subsecs(0));
        let entries = match self.ledger.list_in_range(connection.id, from, to).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "skipping deletion reconciliation");
                return 0;
            }
        };

        let seen: HashSet<String> = batch
            .events
            .iter()
            .map(|event| event_integration_key(&event.calendar_id, &event.id))
            .collect();
        let vanished: Vec<String> = entries
            .into_iter()
            .filter(|entry| !batch.failed_calendars.contains(&entry.calendar_id))
            .filter(|entry| surely_in_window(entry, from, to))
            .filter(|entry| !seen.contains(&entry.integration))
            .map(|entry| entry.integration)
            .collect();
        if vanished.is_empty() {
            return 0;
        }

        let mut deleted = 0;
        for integration in &vanished {
            match self.tasks.delete_task_by_integration(connection.user_id, integration).await {
                Ok(count) => deleted += count,
                Err(err) => warn!(integration = %integration, error = %err, "failed to delete task"),
            }
        }
        if let Err(err) = self.ledger.remove(connection.id, &vanished).await {
            warn!(error = %err, "failed to prune processed events");
        }
        deleted
    }

    async fn stamp_last_sync(&self, connection_id: Uuid) {
        if let Err(err) = self.connections.touch_last_sync(connection_id, self.clock.utc_now()).await
        {
            error!(connection_id = %connection_id, error = %err, "failed to stamp last sync");
        }
    }
}

/// Whether a fetch over `(from, to)` must have returned the entry's event.
///
/// All-day events are matched upstream against the calendar's local date,
/// which can sit up to a day away from the stored UTC midnight.
fn surely_in_window(entry: &ProcessedEvent, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    let margin = if entry.all_day { Duration::days(1) } else { Duration::zero() };
    entry.event_start - margin > from && entry.event_start + margin < to
}
