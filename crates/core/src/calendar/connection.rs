//! OAuth connection flow and workspace provisioning

use std::sync::Arc;

use kindred_common::Clock;
use kindred_domain::constants::DEFAULT_CALENDAR_WORKSPACE;
use kindred_domain::{
    calendar_integration_key, CalendarConnection, CalendarError, CalendarInfo, Category,
    KindredError, NewCategory, OAuthToken, Result,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::ports::{ConnectionRepository, ProcessedEventLedger, TaskStore, Upserted};
use super::providers::ProviderRegistry;
use super::token::TokenLifecycleManager;
use super::watch::WatchChannelManager;

/// Drives the OAuth connect flow and owns connection lifecycle.
pub struct ConnectionManager {
    providers: Arc<ProviderRegistry>,
    connections: Arc<dyn ConnectionRepository>,
    tasks: Arc<dyn TaskStore>,
    ledger: Arc<dyn ProcessedEventLedger>,
    tokens: Arc<TokenLifecycleManager>,
    watches: Arc<WatchChannelManager>,
    clock: Arc<dyn Clock>,
}

impl ConnectionManager {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        connections: Arc<dyn ConnectionRepository>,
        tasks: Arc<dyn TaskStore>,
        ledger: Arc<dyn ProcessedEventLedger>,
        tokens: Arc<TokenLifecycleManager>,
        watches: Arc<WatchChannelManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { providers, connections, tasks, ledger, tokens, watches, clock }
    }

    /// Consent URL for `provider` carrying the user id as OAuth state.
    pub fn initiate_oauth(&self, provider: &str, user_id: Uuid) -> Result<String> {
        let adapter = self.providers.resolve(provider)?;
        Ok(adapter.generate_auth_url(&user_id.to_string()))
    }

    /// Complete the OAuth flow.
    ///
    /// Keyed on the remote account, so replayed or concurrent callbacks for
    /// one account converge on a single connection. Only the callback that
    /// creates the connection provisions categories and registers watches;
    /// failures there are logged and never fail the flow.
    #[instrument(skip(self, code, state))]
    pub async fn handle_callback(
        &self,
        provider: &str,
        code: &str,
        state: &str,
    ) -> Result<CalendarConnection> {
        let adapter = self.providers.resolve(provider)?;
        let user_id = Uuid::parse_str(state.trim())
            .map_err(|_| CalendarError::InvalidState(state.to_string()))?;

        let token = adapter.exchange_code(code).await.map_err(|err| {
            as_calendar_error(err, CalendarError::CodeExchangeFailed)
        })?;
        let account = adapter.get_account_info(&token).await.map_err(|err| {
            as_calendar_error(err, CalendarError::AccountInfoFailed)
        })?;

        let candidate =
            CalendarConnection::new(user_id, adapter.tag(), &account.email, &token, self.clock.utc_now());

        match self.connections.upsert(&candidate).await? {
            Upserted::Created(connection) => {
                info!(connection_id = %connection.id, "created calendar connection");
                if let Err(err) = self.provision_categories(&connection, &token).await {
                    error!(error = %err, "failed to provision calendar categories");
                }
                self.register_watches(&connection, &token).await;
                self.reload(connection).await
            }
            // Only the creating callback provisions; a concurrent duplicate
            // lands here and must not register a second set of channels.
            Upserted::Updated(connection) => {
                info!(connection_id = %connection.id, "refreshed tokens of existing connection");
                Ok(connection)
            }
        }
    }

    /// Create a category (in the default workspace) for every remote
    /// calendar not yet mirrored. Returns the categories created.
    pub async fn provision_categories(
        &self,
        connection: &CalendarConnection,
        token: &OAuthToken,
    ) -> Result<Vec<Category>> {
        let calendars = self.providers.get(connection.provider)?.list_calendars(token).await?;
        self.ensure_categories(connection, &calendars, |_| DEFAULT_CALENDAR_WORKSPACE.to_string())
            .await
    }

    /// Create categories for the selected calendars.
    ///
    /// With `merge_into_one` every category lands in the shared calendar
    /// workspace; otherwise each calendar gets a workspace named after it.
    #[instrument(skip(self, calendar_ids))]
    pub async fn setup_workspaces(
        &self,
        user_id: Uuid,
        connection_id: Uuid,
        calendar_ids: &[String],
        merge_into_one: bool,
    ) -> Result<Vec<Category>> {
        if calendar_ids.is_empty() {
            return Err(KindredError::InvalidInput("no calendars selected".into()));
        }

        let connection = self.load(connection_id, user_id).await?;
        let token = self.tokens.get_valid_token(&connection).await?;
        let selected: Vec<CalendarInfo> = self
            .providers
            .get(connection.provider)?
            .list_calendars(&token)
            .await?
            .into_iter()
            .filter(|calendar| calendar_ids.contains(&calendar.id))
            .collect();

        self.ensure_categories(&connection, &selected, |calendar| {
            if merge_into_one {
                DEFAULT_CALENDAR_WORKSPACE.to_string()
            } else {
                calendar.name.clone()
            }
        })
        .await
    }

    pub async fn list_connections(&self, user_id: Uuid) -> Result<Vec<CalendarConnection>> {
        self.connections.list_for_user(user_id).await
    }

    pub async fn list_calendars(&self, user_id: Uuid, connection_id: Uuid) -> Result<Vec<CalendarInfo>> {
        let connection = self.load(connection_id, user_id).await?;
        let token = self.tokens.get_valid_token(&connection).await?;
        self.providers.get(connection.provider)?.list_calendars(&token).await
    }

    /// Delete a connection owned by `user_id`.
    ///
    /// A connection owned by someone else is reported as not found.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, user_id: Uuid, connection_id: Uuid) -> Result<()> {
        let connection = self.load(connection_id, user_id).await?;

        if let Err(err) = self.watches.stop_watch_channels(&connection).await {
            warn!(error = %err, "failed to stop watch channels");
        }

        if !self.connections.delete_for_user(connection_id, user_id).await? {
            return Err(CalendarError::ConnectionNotFound(connection_id.to_string()).into());
        }
        self.tokens.forget(connection_id);

        if let Err(err) = self.ledger.clear_connection(connection_id).await {
            warn!(error = %err, "failed to clear processed events");
        }
        info!("calendar connection removed");
        Ok(())
    }

    async fn ensure_categories(
        &self,
        connection: &CalendarConnection,
        calendars: &[CalendarInfo],
        workspace_for: impl Fn(&CalendarInfo) -> String,
    ) -> Result<Vec<Category>> {
        let mut created = Vec::new();
        for calendar in calendars {
            let integration = calendar_integration_key(connection.id, &calendar.id);
            if self
                .tasks
                .find_category_by_integration(connection.user_id, &integration)
                .await?
                .is_some()
            {
                continue;
            }

            let category = self
                .tasks
                .create_category(NewCategory {
                    user_id: connection.user_id,
                    name: calendar.name.clone(),
                    workspace_name: workspace_for(calendar),
                    integration,
                })
                .await?;
            created.push(category);
        }
        info!(connection_id = %connection.id, created = created.len(), "calendar categories ready");
        Ok(created)
    }

    async fn register_watches(&self, connection: &CalendarConnection, token: &OAuthToken) {
        if let Err(err) = self.watches.setup_watch_channels(connection, token).await {
            error!(connection_id = %connection.id, error = %err, "failed to register watch channels");
        }
    }

    async fn load(&self, connection_id: Uuid, user_id: Uuid) -> Result<CalendarConnection> {
        self.connections
            .find_for_user(connection_id, user_id)
            .await?
            .ok_or_else(|| CalendarError::ConnectionNotFound(connection_id.to_string()).into())
    }

    /// Re-read a connection so watch channels stored after the upsert show up.
    async fn reload(&self, connection: CalendarConnection) -> Result<CalendarConnection> {
        Ok(self.connections.find_by_id(connection.id).await?.unwrap_or(connection))
    }
}

/// Keep calendar errors from the adapter; wrap anything else in `kind`.
fn as_calendar_error(err: KindredError, kind: fn(String) -> CalendarError) -> KindredError {
    match err {
        KindredError::Calendar(_) => err,
        other => kind(other.to_string()).into(),
    }
}
