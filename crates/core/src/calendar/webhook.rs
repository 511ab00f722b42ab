//! Inbound push-notification handling

use std::sync::Arc;

use kindred_common::time::days_ahead_window;
use kindred_common::{Clock, FixedWindowRateLimiter, SystemClock};
use kindred_domain::constants::WEBHOOK_SYNC_DAYS_AHEAD;
use kindred_domain::{CalendarError, Result};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::ports::ConnectionRepository;
use super::sync::SyncOrchestrator;

/// Provider-reported state of the watched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Handshake sent once when a channel is created.
    Sync,
    /// The watched calendar changed.
    Exists,
    /// The watched calendar was deleted.
    NotExists,
    Unknown(String),
}

impl From<&str> for ResourceState {
    fn from(value: &str) -> Self {
        match value {
            "sync" => Self::Sync,
            "exists" => Self::Exists,
            "not_exists" => Self::NotExists,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Headers of one inbound notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookNotification {
    pub channel_id: String,
    pub resource_id: String,
    pub resource_state: String,
    pub resource_uri: Option<String>,
    pub message_number: Option<String>,
    /// Opaque token set at registration; not used for validation.
    pub channel_token: Option<String>,
}

/// What the gatekeeper did with an accepted notification.
#[derive(Debug)]
pub enum WebhookOutcome {
    Acknowledged,
    /// A background sync was launched; dropping the handle detaches it.
    SyncScheduled(JoinHandle<()>),
    ResourceDeleted,
    Ignored(String),
}

/// Validates notifications and triggers background syncs.
pub struct WebhookGatekeeper<C: Clock = SystemClock> {
    connections: Arc<dyn ConnectionRepository>,
    orchestrator: Arc<SyncOrchestrator>,
    limiter: Arc<FixedWindowRateLimiter<C>>,
    clock: Arc<dyn Clock>,
}

impl<C: Clock> WebhookGatekeeper<C> {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        orchestrator: Arc<SyncOrchestrator>,
        limiter: Arc<FixedWindowRateLimiter<C>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { connections, orchestrator, limiter, clock }
    }

    pub fn limiter(&self) -> &Arc<FixedWindowRateLimiter<C>> {
        &self.limiter
    }

    /// Run the checks in order: rate limit, connection lookup, channel match.
    /// Only then is the resource state acted on.
    #[instrument(skip(self, notification), fields(channel_id = %notification.channel_id))]
    pub async fn handle_notification(
        &self,
        connection_id: &str,
        notification: &WebhookNotification,
    ) -> Result<WebhookOutcome> {
        if !self.limiter.allow(connection_id) {
            warn!(connection_id, "webhook rate limit exceeded");
            return Err(CalendarError::RateLimitExceeded(connection_id.to_string()).into());
        }

        let id = Uuid::parse_str(connection_id)
            .map_err(|_| CalendarError::MalformedConnectionId(connection_id.to_string()))?;
        let connection = self
            .connections
            .find_by_id(id)
            .await?
            .ok_or_else(|| CalendarError::ConnectionNotFound(connection_id.to_string()))?;

        if connection
            .find_watch_channel(&notification.channel_id, &notification.resource_id)
            .is_none()
        {
            warn!(resource_id = %notification.resource_id, "notification for unknown watch channel");
            return Err(CalendarError::UnknownWatchChannel {
                channel_id: notification.channel_id.clone(),
                resource_id: notification.resource_id.clone(),
            }
            .into());
        }

        let outcome = match ResourceState::from(notification.resource_state.as_str()) {
            ResourceState::Sync => {
                debug!("watch channel handshake");
                WebhookOutcome::Acknowledged
            }
            ResourceState::Exists => {
                WebhookOutcome::SyncScheduled(self.spawn_sync(connection.id, connection.user_id))
            }
            ResourceState::NotExists => {
                info!(connection_id = %connection.id, "watched resource deleted");
                WebhookOutcome::ResourceDeleted
            }
            ResourceState::Unknown(other) => {
                warn!(resource_state = %other, "unrecognized resource state");
                WebhookOutcome::Ignored(other)
            }
        };
        Ok(outcome)
    }

    fn spawn_sync(&self, connection_id: Uuid, user_id: Uuid) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let (from, to) = days_ahead_window(self.clock.utc_now(), WEBHOOK_SYNC_DAYS_AHEAD);

        tokio::spawn(async move {
            match orchestrator.sync_events_to_tasks(connection_id, user_id, from, to).await {
                Ok(result) => info!(
                    connection_id = %connection_id,
                    created = result.tasks_created,
                    skipped = result.tasks_skipped,
                    "webhook sync finished"
                ),
                Err(err) => error!(connection_id = %connection_id, error = %err, "webhook sync failed"),
            }
        })
    }
}
