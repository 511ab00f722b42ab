//! Calendar connection and provider-neutral calendar types

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_tag_conversions;

/// Supported calendar providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    Google,
}

impl_tag_conversions!(ProviderTag {
    Google => "google",
});

/// OAuth credentials for one connection.
///
/// `Debug` redacts the secrets so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthToken {
    /// True if the token is expired or expires within `skew` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expiry - now < skew
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expiry", &self.expiry)
            .field("token_type", &self.token_type)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Subscription to change notifications for one remote calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchChannel {
    pub calendar_id: String,
    pub channel_id: String,
    pub resource_id: String,
    pub expiration: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One OAuth grant tying a local user to one remote account.
///
/// Tokens are skipped by serde: API responses never carry them.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: ProviderTag,
    pub provider_account_id: String,
    #[serde(skip)]
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: String,
    pub token_expiry: DateTime<Utc>,
    pub scopes: Vec<String>,
    pub is_primary: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub watch_channels: Vec<WatchChannel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarConnection {
    /// Build a fresh connection from a completed OAuth exchange.
    pub fn new(
        user_id: Uuid,
        provider: ProviderTag,
        provider_account_id: impl Into<String>,
        token: &OAuthToken,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            provider,
            provider_account_id: provider_account_id.into(),
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            token_expiry: token.expiry,
            scopes: token.scopes.clone(),
            is_primary: false,
            last_sync: None,
            watch_channels: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The stored credentials.
    pub fn token(&self) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expiry: self.token_expiry,
            token_type: "Bearer".to_string(),
            scopes: self.scopes.clone(),
        }
    }

    /// Find the watch channel matching both ids exactly.
    pub fn find_watch_channel(&self, channel_id: &str, resource_id: &str) -> Option<&WatchChannel> {
        self.watch_channels
            .iter()
            .find(|watch| watch.channel_id == channel_id && watch.resource_id == resource_id)
    }

    /// Webhook URL the provider should call for this connection.
    pub fn webhook_url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.id)
    }
}

impl fmt::Debug for CalendarConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarConnection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("provider_account_id", &self.provider_account_id)
            .field("token_expiry", &self.token_expiry)
            .field("last_sync", &self.last_sync)
            .field("watch_channels", &self.watch_channels.len())
            .finish_non_exhaustive()
    }
}

/// Remote account identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// A remote calendar as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_primary: bool,
    /// owner, writer, reader
    pub access_role: String,
}

/// Provider-neutral calendar event. Not persisted.
///
/// Times keep the offset the provider reported so day truncation happens in
/// the event's own timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    pub calendar_id: String,
    pub calendar_name: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub is_all_day: bool,
    pub attendees: Vec<String>,
    /// confirmed, tentative, cancelled
    pub status: String,
}

/// Provider answer to a watch registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchResponse {
    pub channel_id: String,
    pub resource_id: String,
    pub expiration: DateTime<Utc>,
}
