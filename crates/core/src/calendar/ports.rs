//! Calendar engine ports
//!
//! Adapters in `kindred-infra` implement these traits; services in this crate
//! depend only on the trait objects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kindred_domain::{
    AccountInfo, CalendarConnection, CalendarInfo, Category, NewCategory, OAuthToken,
    ProcessedEvent, ProviderEvent, ProviderTag, Result, TaskPayload, WatchChannel, WatchResponse,
};
use uuid::Uuid;

/// Events fetched across every calendar of an account.
///
/// Calendars whose fetch failed are listed in `failed_calendars` and their
/// events are absent from `events`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub events: Vec<ProviderEvent>,
    pub failed_calendars: Vec<String>,
}

/// Uniform contract every calendar backend implements.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Provider tag this adapter serves.
    fn tag(&self) -> ProviderTag;

    /// Consent URL requesting offline access, with `state` echoed back.
    fn generate_auth_url(&self, state: &str) -> String;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<OAuthToken>;

    /// Obtain a new access token from a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken>;

    /// Identity of the account the token belongs to.
    async fn get_account_info(&self, token: &OAuthToken) -> Result<AccountInfo>;

    async fn list_calendars(&self, token: &OAuthToken) -> Result<Vec<CalendarInfo>>;

    /// Events of every calendar in `[from, to]`, with per-calendar failures
    /// reported instead of raised.
    async fn fetch_event_batch(
        &self,
        token: &OAuthToken,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<EventBatch>;

    /// Events of every calendar in `[from, to]`. A calendar that fails to
    /// load contributes nothing.
    async fn fetch_events(
        &self,
        token: &OAuthToken,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProviderEvent>> {
        Ok(self.fetch_event_batch(token, from, to).await?.events)
    }

    async fn create_event(&self, token: &OAuthToken, event: &ProviderEvent) -> Result<ProviderEvent>;

    async fn update_event(
        &self,
        token: &OAuthToken,
        event_id: &str,
        event: &ProviderEvent,
    ) -> Result<ProviderEvent>;

    async fn delete_event(&self, token: &OAuthToken, calendar_id: &str, event_id: &str)
        -> Result<()>;

    /// Register a push-notification channel for one calendar.
    async fn watch_calendar(
        &self,
        token: &OAuthToken,
        calendar_id: &str,
        channel_id: &str,
        webhook_url: &str,
    ) -> Result<WatchResponse>;

    async fn stop_watch(&self, token: &OAuthToken, channel_id: &str, resource_id: &str)
        -> Result<()>;
}

/// Outcome of [`ConnectionRepository::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub enum Upserted {
    /// No connection existed for the account; the candidate was stored.
    Created(CalendarConnection),
    /// An existing connection had its tokens overwritten.
    Updated(CalendarConnection),
}

impl Upserted {
    pub fn connection(&self) -> &CalendarConnection {
        match self {
            Self::Created(connection) | Self::Updated(connection) => connection,
        }
    }

    pub fn into_connection(self) -> CalendarConnection {
        match self {
            Self::Created(connection) | Self::Updated(connection) => connection,
        }
    }
}

/// Persistence for calendar connections and their watch channels.
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CalendarConnection>>;

    /// Find a connection only if it belongs to `user_id`.
    async fn find_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Option<CalendarConnection>>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<CalendarConnection>>;

    /// Connections holding at least one watch channel.
    async fn list_with_watch_channels(&self) -> Result<Vec<CalendarConnection>>;

    /// Insert `candidate`, or overwrite the tokens of the connection already
    /// stored for the same (user, provider, account) triple.
    ///
    /// Must be atomic: two concurrent upserts for one triple yield exactly one
    /// row.
    async fn upsert(&self, candidate: &CalendarConnection) -> Result<Upserted>;

    /// Persist a refreshed token. An empty refresh token keeps the stored one.
    async fn update_token(
        &self,
        id: Uuid,
        token: &OAuthToken,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn replace_watch_channels(
        &self,
        id: Uuid,
        channels: &[WatchChannel],
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Swap one channel (by channel id) for its renewal.
    async fn replace_watch_channel(
        &self,
        id: Uuid,
        old_channel_id: &str,
        channel: &WatchChannel,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn touch_last_sync(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Delete a connection owned by `user_id`. Returns false if none matched.
    async fn delete_for_user(&self, id: Uuid, user_id: Uuid) -> Result<bool>;
}

/// The task/category collaborator sync writes through.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_category_by_integration(
        &self,
        user_id: Uuid,
        integration: &str,
    ) -> Result<Option<Category>>;

    async fn create_category(&self, category: NewCategory) -> Result<Category>;

    /// Append a task to a category.
    ///
    /// A task with the same integration key already existing must fail with
    /// `CalendarError::TaskWriteConflict`.
    async fn insert_task(&self, task: &TaskPayload) -> Result<()>;

    /// Remove the user's task carrying `integration`. Returns rows removed.
    async fn delete_task_by_integration(&self, user_id: Uuid, integration: &str) -> Result<usize>;
}

/// Record of tasks created by sync, used to reconcile remote deletions.
#[async_trait]
pub trait ProcessedEventLedger: Send + Sync {
    async fn record(&self, entry: &ProcessedEvent) -> Result<()>;

    /// Entries of a connection whose event start lies strictly inside
    /// `(from, to)`.
    async fn list_in_range(
        &self,
        connection_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProcessedEvent>>;

    async fn remove(&self, connection_id: Uuid, integrations: &[String]) -> Result<usize>;

    async fn clear_connection(&self, connection_id: Uuid) -> Result<usize>;
}
