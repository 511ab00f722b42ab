//! Google Calendar v3 and OAuth wire types

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, TimeZone, Utc};
use kindred_domain::{CalendarInfo, ProviderEvent};
use serde::{Deserialize, Serialize};

/// `POST /token` response for both code exchange and refresh.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// `GET /calendars/{id}` response.
#[derive(Debug, Deserialize)]
pub(crate) struct CalendarResource {
    pub id: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalendarListResponse {
    #[serde(default)]
    pub items: Vec<CalendarListEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub access_role: String,
}

impl From<CalendarListEntry> for CalendarInfo {
    fn from(entry: CalendarListEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.summary,
            description: entry.description,
            is_primary: entry.primary,
            access_role: entry.access_role,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventsResponse {
    #[serde(default)]
    pub items: Vec<GoogleEvent>,
    pub next_page_token: Option<String>,
}

/// Event resource, used for reads and as the write body.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoogleEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default)]
    pub start: EventDateTime,
    #[serde(default)]
    pub end: EventDateTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventDateTime {
    /// `YYYY-MM-DD`, set for all-day events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// RFC 3339, set for timed events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Attendee {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct WatchRequest<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub address: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WatchResponseBody {
    pub id: String,
    pub resource_id: String,
    /// Epoch milliseconds as a decimal string.
    pub expiration: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StopChannelRequest<'a> {
    pub id: &'a str,
    pub resource_id: &'a str,
}

impl GoogleEvent {
    /// Map to the provider-neutral event.
    ///
    /// `date` values become UTC midnight; `dateTime` values keep their offset.
    pub(crate) fn into_provider_event(
        self,
        calendar_id: &str,
        calendar_name: &str,
    ) -> Result<ProviderEvent, String> {
        let is_all_day = self.start.date.is_some();
        let start = self.start.parse().map_err(|e| format!("event {}: start {e}", self.id))?;
        let end = self.end.parse().map_err(|e| format!("event {}: end {e}", self.id))?;

        Ok(ProviderEvent {
            id: self.id,
            calendar_id: calendar_id.to_string(),
            calendar_name: calendar_name.to_string(),
            summary: self.summary,
            description: self.description,
            location: self.location,
            start,
            end,
            is_all_day,
            attendees: self
                .attendees
                .into_iter()
                .map(|attendee| attendee.email.trim().to_string())
                .filter(|email| !email.is_empty())
                .collect(),
            status: self.status,
        })
    }

    /// Write body for insert/update.
    pub(crate) fn from_provider_event(event: &ProviderEvent) -> Self {
        Self {
            id: String::new(),
            summary: event.summary.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            status: event.status.clone(),
            start: EventDateTime::from_time(event.start, event.is_all_day),
            end: EventDateTime::from_time(event.end, event.is_all_day),
            attendees: event.attendees.iter().map(|email| Attendee { email: email.clone() }).collect(),
        }
    }
}

impl EventDateTime {
    fn parse(&self) -> Result<DateTime<FixedOffset>, String> {
        if let Some(date) = &self.date {
            let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| format!("invalid date {date:?}: {e}"))?;
            let midnight = day.and_hms_opt(0, 0, 0).ok_or("invalid midnight")?;
            return Ok(Utc.from_utc_datetime(&midnight).fixed_offset());
        }

        match &self.date_time {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| format!("invalid dateTime {raw:?}: {e}")),
            None => Err("missing date and dateTime".to_string()),
        }
    }

    fn from_time(at: DateTime<FixedOffset>, all_day: bool) -> Self {
        if all_day {
            Self { date: Some(at.format("%Y-%m-%d").to_string()), date_time: None }
        } else {
            Self { date: None, date_time: Some(at.to_rfc3339_opts(SecondsFormat::Secs, true)) }
        }
    }
}

/// RFC 3339 in UTC as Google expects for `timeMin` / `timeMax`.
pub(crate) fn format_query_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
