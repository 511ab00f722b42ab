//! Scriptable in-memory calendar provider.

use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use kindred_core::{CalendarProvider, EventBatch};
use kindred_domain::{
    AccountInfo, CalendarError, CalendarInfo, KindredError, OAuthToken, ProviderEvent, ProviderTag,
    Result as DomainResult, WatchResponse,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchCall {
    pub calendar_id: String,
    pub channel_id: String,
    pub webhook_url: String,
}

#[derive(Default)]
struct FakeState {
    calendars: Vec<CalendarInfo>,
    events: Vec<ProviderEvent>,
    failed_calendars: Vec<String>,
    /// UTC offset of the calendars' time zone; all-day events span its local day.
    utc_offset_hours: i64,
    account_email: String,
    token_expiry: Option<DateTime<Utc>>,
    watch_expiration: Option<DateTime<Utc>>,
    refresh_delay: Option<StdDuration>,
    rotated_refresh_token: String,
    fail_exchange: bool,
    fail_refresh: bool,
    fail_list: bool,
    fail_watch: bool,
    exchange_calls: usize,
    refresh_calls: usize,
    watch_calls: Vec<WatchCall>,
    stopped: Vec<(String, String)>,
}

/// Provider double whose responses are configured per test.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new(now: DateTime<Utc>) -> Self {
        let provider = Self::default();
        {
            let mut state = provider.state.lock().unwrap();
            state.account_email = "someone@example.com".into();
            state.token_expiry = Some(now + Duration::hours(1));
            state.watch_expiration = Some(now + Duration::days(7));
        }
        provider
    }

    pub fn calendar(id: &str, name: &str) -> CalendarInfo {
        CalendarInfo {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            is_primary: id == "primary",
            access_role: "owner".into(),
        }
    }

    pub fn set_calendars(&self, calendars: Vec<CalendarInfo>) {
        self.state.lock().unwrap().calendars = calendars;
    }

    pub fn set_events(&self, events: Vec<ProviderEvent>) {
        self.state.lock().unwrap().events = events;
    }

    pub fn set_utc_offset_hours(&self, hours: i64) {
        self.state.lock().unwrap().utc_offset_hours = hours;
    }

    pub fn set_failed_calendars(&self, calendars: Vec<String>) {
        self.state.lock().unwrap().failed_calendars = calendars;
    }

    pub fn set_account_email(&self, email: &str) {
        self.state.lock().unwrap().account_email = email.into();
    }

    pub fn set_token_expiry(&self, expiry: DateTime<Utc>) {
        self.state.lock().unwrap().token_expiry = Some(expiry);
    }

    pub fn set_refresh_delay(&self, delay: StdDuration) {
        self.state.lock().unwrap().refresh_delay = Some(delay);
    }

    /// Refresh responses carry this new refresh token.
    pub fn rotate_refresh_token(&self, refresh: &str) {
        self.state.lock().unwrap().rotated_refresh_token = refresh.into();
    }

    pub fn fail_exchange(&self) {
        self.state.lock().unwrap().fail_exchange = true;
    }

    pub fn fail_refresh(&self) {
        self.state.lock().unwrap().fail_refresh = true;
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_watch(&self, fail: bool) {
        self.state.lock().unwrap().fail_watch = fail;
    }

    pub fn exchange_calls(&self) -> usize {
        self.state.lock().unwrap().exchange_calls
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }

    pub fn watch_calls(&self) -> Vec<WatchCall> {
        self.state.lock().unwrap().watch_calls.clone()
    }

    pub fn stopped(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().stopped.clone()
    }

    fn issue_token(&self, access: String, refresh: String) -> OAuthToken {
        let expiry = self.state.lock().unwrap().token_expiry.unwrap_or_else(Utc::now);
        OAuthToken {
            access_token: access,
            refresh_token: refresh,
            expiry,
            token_type: "Bearer".into(),
            scopes: vec!["calendar".into()],
        }
    }
}

#[async_trait]
impl CalendarProvider for FakeProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Google
    }

    fn generate_auth_url(&self, state: &str) -> String {
        format!("https://accounts.example.com/auth?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> DomainResult<OAuthToken> {
        let fail = {
            let mut state = self.state.lock().unwrap();
            state.exchange_calls += 1;
            state.fail_exchange
        };
        if fail {
            return Err(KindredError::Network("invalid_grant".into()));
        }
        Ok(self.issue_token(format!("access-{code}"), format!("refresh-{code}")))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> DomainResult<OAuthToken> {
        let (fail, delay, call, rotated) = {
            let mut state = self.state.lock().unwrap();
            state.refresh_calls += 1;
            (
                state.fail_refresh,
                state.refresh_delay,
                state.refresh_calls,
                state.rotated_refresh_token.clone(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(CalendarError::TokenRefreshFailed("token revoked".into()).into());
        }
        Ok(self.issue_token(format!("refreshed-{call}"), rotated))
    }

    async fn get_account_info(&self, _token: &OAuthToken) -> DomainResult<AccountInfo> {
        let email = self.state.lock().unwrap().account_email.clone();
        Ok(AccountInfo { id: format!("id-{email}"), email, name: "Someone".into() })
    }

    async fn list_calendars(&self, _token: &OAuthToken) -> DomainResult<Vec<CalendarInfo>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(CalendarError::CalendarListFailed("upstream 500".into()).into());
        }
        Ok(state.calendars.clone())
    }

    async fn fetch_event_batch(
        &self,
        _token: &OAuthToken,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<EventBatch> {
        // Whole-second bounds, end after timeMin, start before an exclusive timeMax.
        let (from, to) = (from.trunc_subsecs(0), to.trunc_subsecs(0));
        let state = self.state.lock().unwrap();
        let events = state
            .events
            .iter()
            .filter(|event| !state.failed_calendars.contains(&event.calendar_id))
            .filter(|event| {
                let shift = if event.is_all_day { state.utc_offset_hours } else { 0 };
                let shift = Duration::hours(shift);
                let start = event.start.with_timezone(&Utc) - shift;
                let end = event.end.with_timezone(&Utc) - shift;
                end > from && start < to
            })
            .cloned()
            .collect();
        Ok(EventBatch { events, failed_calendars: state.failed_calendars.clone() })
    }

    async fn create_event(
        &self,
        _token: &OAuthToken,
        event: &ProviderEvent,
    ) -> DomainResult<ProviderEvent> {
        self.state.lock().unwrap().events.push(event.clone());
        Ok(event.clone())
    }

    async fn update_event(
        &self,
        _token: &OAuthToken,
        event_id: &str,
        event: &ProviderEvent,
    ) -> DomainResult<ProviderEvent> {
        let mut state = self.state.lock().unwrap();
        state.events.retain(|existing| existing.id != event_id);
        state.events.push(event.clone());
        Ok(event.clone())
    }

    async fn delete_event(
        &self,
        _token: &OAuthToken,
        calendar_id: &str,
        event_id: &str,
    ) -> DomainResult<()> {
        self.state
            .lock()
            .unwrap()
            .events
            .retain(|event| !(event.calendar_id == calendar_id && event.id == event_id));
        Ok(())
    }

    async fn watch_calendar(
        &self,
        _token: &OAuthToken,
        calendar_id: &str,
        channel_id: &str,
        webhook_url: &str,
    ) -> DomainResult<WatchResponse> {
        let mut state = self.state.lock().unwrap();
        if state.fail_watch {
            return Err(KindredError::Network("watch rejected".into()));
        }
        state.watch_calls.push(WatchCall {
            calendar_id: calendar_id.into(),
            channel_id: channel_id.into(),
            webhook_url: webhook_url.into(),
        });
        Ok(WatchResponse {
            channel_id: channel_id.into(),
            resource_id: format!("res-{calendar_id}"),
            expiration: state.watch_expiration.unwrap_or_else(Utc::now),
        })
    }

    async fn stop_watch(
        &self,
        _token: &OAuthToken,
        channel_id: &str,
        resource_id: &str,
    ) -> DomainResult<()> {
        self.state.lock().unwrap().stopped.push((channel_id.into(), resource_id.into()));
        Ok(())
    }
}
