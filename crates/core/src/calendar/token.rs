//! Access-token lifecycle
//!
//! Hands out a token that stays valid for at least the refresh skew,
//! refreshing and persisting it when needed. Refreshes are serialized per
//! connection so concurrent callers within one process trigger at most one
//! provider round-trip.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use kindred_common::Clock;
use kindred_domain::constants::token_refresh_skew;
use kindred_domain::{CalendarConnection, CalendarError, KindredError, OAuthToken, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::ports::ConnectionRepository;
use super::providers::ProviderRegistry;

pub struct TokenLifecycleManager {
    providers: Arc<ProviderRegistry>,
    connections: Arc<dyn ConnectionRepository>,
    clock: Arc<dyn Clock>,
    skew: Duration,
    refresh_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl TokenLifecycleManager {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        connections: Arc<dyn ConnectionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            providers,
            connections,
            clock,
            skew: token_refresh_skew(),
            refresh_locks: DashMap::new(),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Return a token valid for at least the skew window.
    ///
    /// Refresh failures surface as `TokenRefreshFailed`; the stored token is
    /// left untouched in that case.
    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    pub async fn get_valid_token(&self, connection: &CalendarConnection) -> Result<OAuthToken> {
        let stored = connection.token();
        if !stored.expires_within(self.clock.utc_now(), self.skew) {
            return Ok(stored);
        }

        let lock = self.lock_for(connection.id);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        let current = self
            .connections
            .find_by_id(connection.id)
            .await?
            .ok_or_else(|| CalendarError::ConnectionNotFound(connection.id.to_string()))?;
        let stored = current.token();
        let now = self.clock.utc_now();
        if !stored.expires_within(now, self.skew) {
            debug!("token already refreshed by a concurrent caller");
            return Ok(stored);
        }

        let provider = self.providers.get(current.provider)?;
        let refreshed = provider
            .refresh_token(&stored.refresh_token)
            .await
            .map_err(refresh_failure)?;

        self.connections.update_token(current.id, &refreshed, now).await?;
        info!(
            expiry = %refreshed.expiry,
            rotated = !refreshed.refresh_token.is_empty(),
            "refreshed access token"
        );

        Ok(OAuthToken {
            refresh_token: if refreshed.refresh_token.is_empty() {
                stored.refresh_token
            } else {
                refreshed.refresh_token
            },
            ..refreshed
        })
    }

    /// Drop the refresh lock of a removed connection.
    pub fn forget(&self, connection_id: Uuid) {
        self.refresh_locks.remove(&connection_id);
    }

    /// Connections with a refresh lock currently held in memory.
    pub fn tracked_connections(&self) -> usize {
        self.refresh_locks.len()
    }

    fn lock_for(&self, connection_id: Uuid) -> Arc<Mutex<()>> {
        self.refresh_locks.entry(connection_id).or_default().clone()
    }
}

fn refresh_failure(err: KindredError) -> KindredError {
    match err {
        KindredError::Calendar(CalendarError::TokenRefreshFailed(_)) => err,
        other => CalendarError::TokenRefreshFailed(other.to_string()).into(),
    }
}
