//! Google Calendar implementation of the `CalendarProvider` port.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use kindred_core::{CalendarProvider, EventBatch};
use kindred_domain::{
    AccountInfo, CalendarError, CalendarInfo, KindredError, OAuthToken, ProviderEvent,
    ProviderTag, Result, WatchResponse,
};
use reqwest::{Method, RequestBuilder};
use tracing::{debug, info, instrument, warn};

use super::oauth::GoogleOAuthClient;
use super::types::{
    format_query_time, CalendarListEntry, CalendarListResponse, CalendarResource, EventsResponse,
    GoogleEvent, StopChannelRequest, WatchRequest, WatchResponseBody,
};
use crate::http::HttpClient;

pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar used when an event does not name one.
const PRIMARY_CALENDAR: &str = "primary";

/// Google Calendar REST adapter.
pub struct GoogleCalendarProvider {
    oauth: GoogleOAuthClient,
    http: HttpClient,
    api_base: String,
}

impl GoogleCalendarProvider {
    pub fn new(oauth: GoogleOAuthClient, http: HttpClient) -> Self {
        Self { oauth, http, api_base: GOOGLE_CALENDAR_API_BASE.to_string() }
    }

    /// Override the REST base URL (tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    fn events_url(&self, calendar_id: &str) -> String {
        self.url(&format!("calendars/{}/events", urlencoding::encode(calendar_id)))
    }

    fn authorized(&self, method: Method, url: String, token: &OAuthToken) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(&token.access_token)
    }

    async fn list_calendar_entries(&self, token: &OAuthToken) -> Result<Vec<CalendarListEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request =
                self.authorized(Method::GET, self.url("users/me/calendarList"), token);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let page: CalendarListResponse = self.http.send_json(request).await?;
            entries.extend(page.items);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn list_calendar_events(
        &self,
        token: &OAuthToken,
        calendar: &CalendarListEntry,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ProviderEvent>> {
        let time_min = format_query_time(from);
        let time_max = format_query_time(to);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ];
            if let Some(page) = &page_token {
                query.push(("pageToken", page.as_str()));
            }

            let request =
                self.authorized(Method::GET, self.events_url(&calendar.id), token).query(&query);
            let page: EventsResponse = self.http.send_json(request).await?;

            for item in page.items {
                match item.into_provider_event(&calendar.id, &calendar.summary) {
                    Ok(event) => events.push(event),
                    Err(reason) => {
                        warn!(calendar_id = %calendar.id, %reason, "skipping unparseable event");
                    }
                }
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(events)
    }
}

fn target_calendar(event: &ProviderEvent) -> &str {
    if event.calendar_id.is_empty() {
        PRIMARY_CALENDAR
    } else {
        &event.calendar_id
    }
}

/// Wrap a failure in `kind` unless it is already a calendar error.
fn calendar_failure(err: KindredError, kind: fn(String) -> CalendarError) -> KindredError {
    match err {
        KindredError::Calendar(_) => err,
        other => kind(other.to_string()).into(),
    }
}

fn parse_expiration(raw: Option<&str>) -> Result<DateTime<Utc>> {
    let raw = raw.ok_or_else(|| {
        CalendarError::WatchRegistrationFailed("watch response has no expiration".into())
    })?;
    let millis: i64 = raw.parse().map_err(|_| {
        CalendarError::WatchRegistrationFailed(format!("invalid watch expiration {raw:?}"))
    })?;
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        CalendarError::WatchRegistrationFailed(format!("watch expiration out of range: {millis}"))
            .into()
    })
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Google
    }

    fn generate_auth_url(&self, state: &str) -> String {
        self.oauth.authorization_url(state)
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthToken> {
        self.oauth
            .exchange_code(code)
            .await
            .map_err(|err| calendar_failure(err, CalendarError::CodeExchangeFailed))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken> {
        self.oauth
            .refresh(refresh_token)
            .await
            .map_err(|err| calendar_failure(err, CalendarError::TokenRefreshFailed))
    }

    #[instrument(skip_all)]
    async fn get_account_info(&self, token: &OAuthToken) -> Result<AccountInfo> {
        let request = self.authorized(Method::GET, self.url("calendars/primary"), token);
        let primary: CalendarResource = self
            .http
            .send_json(request)
            .await
            .map_err(|err| calendar_failure(err, CalendarError::AccountInfoFailed))?;

        info!(account = %primary.id, "google account resolved");
        // The primary calendar id is the account email.
        Ok(AccountInfo { id: primary.id.clone(), email: primary.id, name: primary.summary })
    }

    #[instrument(skip_all)]
    async fn list_calendars(&self, token: &OAuthToken) -> Result<Vec<CalendarInfo>> {
        let entries = self
            .list_calendar_entries(token)
            .await
            .map_err(|err| calendar_failure(err, CalendarError::CalendarListFailed))?;

        debug!(count = entries.len(), "google calendars listed");
        Ok(entries.into_iter().map(CalendarInfo::from).collect())
    }

    #[instrument(skip_all, fields(%from, %to))]
    async fn fetch_event_batch(
        &self,
        token: &OAuthToken,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<EventBatch> {
        let calendars = self
            .list_calendar_entries(token)
            .await
            .map_err(|err| calendar_failure(err, CalendarError::CalendarListFailed))?;

        let mut batch = EventBatch::default();
        for calendar in &calendars {
            match self.list_calendar_events(token, calendar, from, to).await {
                Ok(events) => {
                    debug!(calendar_id = %calendar.id, count = events.len(), "calendar events fetched");
                    batch.events.extend(events);
                }
                Err(err) => {
                    let failure = CalendarError::EventFetchFailed {
                        calendar_id: calendar.id.clone(),
                        message: err.to_string(),
                    };
                    warn!(error = %failure, "skipping calendar");
                    batch.failed_calendars.push(calendar.id.clone());
                }
            }
        }

        info!(
            calendars = calendars.len(),
            events = batch.events.len(),
            failed = batch.failed_calendars.len(),
            "google events fetched"
        );
        Ok(batch)
    }

    #[instrument(skip(self, token, event), fields(calendar_id = %target_calendar(event)))]
    async fn create_event(&self, token: &OAuthToken, event: &ProviderEvent) -> Result<ProviderEvent> {
        let calendar_id = target_calendar(event);
        let request = self
            .authorized(Method::POST, self.events_url(calendar_id), token)
            .json(&GoogleEvent::from_provider_event(event));

        let created: GoogleEvent = self.http.send_json(request).await?;
        created
            .into_provider_event(calendar_id, &event.calendar_name)
            .map_err(KindredError::Internal)
    }

    #[instrument(skip(self, token, event))]
    async fn update_event(
        &self,
        token: &OAuthToken,
        event_id: &str,
        event: &ProviderEvent,
    ) -> Result<ProviderEvent> {
        let calendar_id = target_calendar(event);
        let url = format!("{}/{}", self.events_url(calendar_id), urlencoding::encode(event_id));
        let request = self
            .authorized(Method::PUT, url, token)
            .json(&GoogleEvent::from_provider_event(event));

        let updated: GoogleEvent = self.http.send_json(request).await?;
        updated
            .into_provider_event(calendar_id, &event.calendar_name)
            .map_err(KindredError::Internal)
    }

    #[instrument(skip(self, token))]
    async fn delete_event(&self, token: &OAuthToken, calendar_id: &str, event_id: &str) -> Result<()> {
        let calendar_id = if calendar_id.is_empty() { PRIMARY_CALENDAR } else { calendar_id };
        let url = format!("{}/{}", self.events_url(calendar_id), urlencoding::encode(event_id));
        self.http.send_empty(self.authorized(Method::DELETE, url, token)).await
    }

    #[instrument(skip(self, token, webhook_url))]
    async fn watch_calendar(
        &self,
        token: &OAuthToken,
        calendar_id: &str,
        channel_id: &str,
        webhook_url: &str,
    ) -> Result<WatchResponse> {
        let url = format!("{}/watch", self.events_url(calendar_id));
        let request = self.authorized(Method::POST, url, token).json(&WatchRequest {
            id: channel_id,
            kind: "web_hook",
            address: webhook_url,
        });

        let body: WatchResponseBody = self
            .http
            .send_json(request)
            .await
            .map_err(|err| calendar_failure(err, CalendarError::WatchRegistrationFailed))?;

        Ok(WatchResponse {
            channel_id: body.id,
            resource_id: body.resource_id,
            expiration: parse_expiration(body.expiration.as_deref())?,
        })
    }

    #[instrument(skip(self, token))]
    async fn stop_watch(&self, token: &OAuthToken, channel_id: &str, resource_id: &str) -> Result<()> {
        let request = self
            .authorized(Method::POST, self.url("channels/stop"), token)
            .json(&StopChannelRequest { id: channel_id, resource_id });

        self.http
            .send_empty(request)
            .await
            .map_err(|err| calendar_failure(err, CalendarError::WatchRegistrationFailed))
    }
}
