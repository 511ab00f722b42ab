//! Google Calendar adapter: OAuth client, REST provider and wire types

pub mod oauth;
pub mod provider;
mod types;

pub use oauth::{GoogleOAuthClient, GoogleOAuthSettings, GOOGLE_CALENDAR_SCOPES};
pub use provider::{GoogleCalendarProvider, GOOGLE_CALENDAR_API_BASE};
