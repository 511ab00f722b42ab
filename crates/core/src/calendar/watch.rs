//! Push-notification channel management

use std::sync::Arc;

use chrono::Duration;
use kindred_common::Clock;
use kindred_domain::{
    CalendarConnection, CalendarError, KindredError, OAuthToken, RenewalReport, Result,
    WatchChannel,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::ports::ConnectionRepository;
use super::providers::ProviderRegistry;
use super::token::TokenLifecycleManager;

/// Registers, stops and renews watch channels for connections.
pub struct WatchChannelManager {
    providers: Arc<ProviderRegistry>,
    connections: Arc<dyn ConnectionRepository>,
    tokens: Arc<TokenLifecycleManager>,
    clock: Arc<dyn Clock>,
    webhook_base_url: String,
}

impl WatchChannelManager {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        connections: Arc<dyn ConnectionRepository>,
        tokens: Arc<TokenLifecycleManager>,
        clock: Arc<dyn Clock>,
        webhook_base_url: impl Into<String>,
    ) -> Self {
        Self { providers, connections, tokens, clock, webhook_base_url: webhook_base_url.into() }
    }

    /// Register one channel per calendar of the connection and store them.
    ///
    /// Calendars whose registration fails are skipped. Returns the channels
    /// that were stored.
    #[instrument(skip(self, connection, token), fields(connection_id = %connection.id))]
    pub async fn setup_watch_channels(
        &self,
        connection: &CalendarConnection,
        token: &OAuthToken,
    ) -> Result<Vec<WatchChannel>> {
        let provider = self.providers.get(connection.provider)?;
        let calendars = provider.list_calendars(token).await?;
        let webhook_url = connection.webhook_url(&self.webhook_base_url);

        let mut channels = Vec::with_capacity(calendars.len());
        for calendar in &calendars {
            match self.register(connection, token, &calendar.id, &webhook_url).await {
                Ok(channel) => channels.push(channel),
                Err(err) => {
                    warn!(calendar_id = %calendar.id, error = %err, "skipping watch channel");
                }
            }
        }

        self.connections
            .replace_watch_channels(connection.id, &channels, self.clock.utc_now())
            .await?;
        info!(channels = channels.len(), "watch channels registered");
        Ok(channels)
    }

    /// Stop every channel of the connection. Individual failures are logged.
    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    pub async fn stop_watch_channels(&self, connection: &CalendarConnection) -> Result<()> {
        if connection.watch_channels.is_empty() {
            return Ok(());
        }

        let provider = self.providers.get(connection.provider)?;
        let token = match self.tokens.get_valid_token(connection).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "using stored token to stop watch channels");
                connection.token()
            }
        };

        for channel in &connection.watch_channels {
            if let Err(err) =
                provider.stop_watch(&token, &channel.channel_id, &channel.resource_id).await
            {
                warn!(channel_id = %channel.channel_id, error = %err, "failed to stop watch channel");
            }
        }
        Ok(())
    }

    /// Replace `old` with a freshly registered channel for the same calendar.
    ///
    /// The new channel is registered before the old one is stopped so no
    /// notifications are lost in between.
    #[instrument(skip(self, connection, old), fields(connection_id = %connection.id, channel_id = %old.channel_id))]
    pub async fn renew_watch_channel(
        &self,
        connection: &CalendarConnection,
        old: &WatchChannel,
    ) -> Result<WatchChannel> {
        let provider = self.providers.get(connection.provider)?;
        let token = self.tokens.get_valid_token(connection).await?;
        let webhook_url = connection.webhook_url(&self.webhook_base_url);

        let renewed = self.register(connection, &token, &old.calendar_id, &webhook_url).await?;

        if let Err(err) = provider.stop_watch(&token, &old.channel_id, &old.resource_id).await {
            warn!(error = %err, "failed to stop superseded watch channel");
        }

        self.connections
            .replace_watch_channel(connection.id, &old.channel_id, &renewed, self.clock.utc_now())
            .await?;
        Ok(renewed)
    }

    /// Renew every channel expiring within `lookahead`.
    pub async fn renew_expiring(&self, lookahead: Duration) -> Result<RenewalReport> {
        let cutoff = self.clock.utc_now() + lookahead;
        let connections = self.connections.list_with_watch_channels().await?;

        let mut report = RenewalReport::default();
        for connection in &connections {
            report.connections_checked += 1;
            for channel in connection.watch_channels.iter().filter(|c| c.expiration <= cutoff) {
                match self.renew_watch_channel(connection, channel).await {
                    Ok(_) => report.channels_renewed += 1,
                    Err(err) => {
                        report.channels_failed += 1;
                        error!(
                            connection_id = %connection.id,
                            channel_id = %channel.channel_id,
                            error = %err,
                            "watch channel renewal failed"
                        );
                    }
                }
            }
        }

        info!(
            checked = report.connections_checked,
            renewed = report.channels_renewed,
            failed = report.channels_failed,
            "watch channel renewal pass complete"
        );
        Ok(report)
    }

    async fn register(
        &self,
        connection: &CalendarConnection,
        token: &OAuthToken,
        calendar_id: &str,
        webhook_url: &str,
    ) -> Result<WatchChannel> {
        let provider = self.providers.get(connection.provider)?;
        let channel_id = Uuid::new_v4().to_string();
        let response = provider
            .watch_calendar(token, calendar_id, &channel_id, webhook_url)
            .await
            .map_err(watch_failure)?;

        Ok(WatchChannel {
            calendar_id: calendar_id.to_string(),
            channel_id: response.channel_id,
            resource_id: response.resource_id,
            expiration: response.expiration,
            created_at: self.clock.utc_now(),
        })
    }
}

fn watch_failure(err: KindredError) -> KindredError {
    match err {
        KindredError::Calendar(CalendarError::WatchRegistrationFailed(_)) => err,
        other => CalendarError::WatchRegistrationFailed(other.to_string()).into(),
    }
}
