//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Kindred
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum KindredError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Failures raised by the calendar connection and sync engine.
///
/// Some kinds are non-fatal by contract (`EventFetchFailed`,
/// `CategoryNotFoundForCalendar`, `TaskWriteConflict`): callers absorb them
/// into sync counters instead of propagating.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum CalendarError {
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("invalid OAuth state: {0}")]
    InvalidState(String),

    #[error("provider declined authorization: {0}")]
    ProviderDeclined(String),

    #[error("failed to exchange authorization code: {0}")]
    CodeExchangeFailed(String),

    #[error("failed to resolve account info: {0}")]
    AccountInfoFailed(String),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("failed to refresh token: {0}")]
    TokenRefreshFailed(String),

    #[error("failed to list calendars: {0}")]
    CalendarListFailed(String),

    #[error("failed to fetch events for calendar {calendar_id}: {message}")]
    EventFetchFailed { calendar_id: String, message: String },

    #[error("no category for calendar {0}")]
    CategoryNotFoundForCalendar(String),

    #[error("task already exists for integration {0}")]
    TaskWriteConflict(String),

    #[error("failed to write task: {0}")]
    TaskWriteFailed(String),

    #[error("rate limit exceeded for {0}")]
    RateLimitExceeded(String),

    #[error("unknown watch channel {channel_id} / {resource_id}")]
    UnknownWatchChannel { channel_id: String, resource_id: String },

    #[error("malformed connection id: {0}")]
    MalformedConnectionId(String),

    #[error("watch channel request failed: {0}")]
    WatchRegistrationFailed(String),
}

impl CalendarError {
    /// Stable machine-readable name of the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedProvider(_) => "unsupported_provider",
            Self::InvalidState(_) => "invalid_state",
            Self::ProviderDeclined(_) => "provider_declined",
            Self::CodeExchangeFailed(_) => "code_exchange_failed",
            Self::AccountInfoFailed(_) => "account_info_failed",
            Self::ConnectionNotFound(_) => "connection_not_found",
            Self::TokenRefreshFailed(_) => "token_refresh_failed",
            Self::CalendarListFailed(_) => "calendar_list_failed",
            Self::EventFetchFailed { .. } => "event_fetch_failed",
            Self::CategoryNotFoundForCalendar(_) => "category_not_found_for_calendar",
            Self::TaskWriteConflict(_) => "task_write_conflict",
            Self::TaskWriteFailed(_) => "task_write_failed",
            Self::RateLimitExceeded(_) => "rate_limit_exceeded",
            Self::UnknownWatchChannel { .. } => "unknown_watch_channel",
            Self::MalformedConnectionId(_) => "malformed_connection_id",
            Self::WatchRegistrationFailed(_) => "watch_registration_failed",
        }
    }
}

impl KindredError {
    /// Stable machine-readable name of the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::Auth(_) => "unauthenticated",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
            Self::Calendar(err) => err.kind(),
        }
    }

    /// Borrow the calendar error, if this is one.
    pub const fn as_calendar(&self) -> Option<&CalendarError> {
        match self {
            Self::Calendar(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for Kindred operations
pub type Result<T> = std::result::Result<T, KindredError>;
