//! Shared helpers for route tests: a scriptable provider, encrypted SQLite
//! stores in a temp dir, and request/response plumbing.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use kindred_api::identity::USER_ID_HEADER;
use kindred_api::{router, AppContext, CalendarPorts, CalendarServices, GatewayHeaderResolver};
use kindred_common::{Clock, FixedWindowRateLimiter, MockClock};
use kindred_core::{CalendarProvider, EventBatch, ProviderRegistry};
use kindred_domain::{
    AccountInfo, CalendarError, CalendarInfo, OAuthToken, ProviderEvent, ProviderTag,
    Result as DomainResult, WatchResponse,
};
use kindred_infra::{
    DbManager, SqliteConnectionRepository, SqliteProcessedEventLedger, SqliteTaskStore,
};
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const APP_REDIRECT: &str = "kindred://calendar";

#[derive(Default)]
struct ProviderState {
    now: Option<DateTime<Utc>>,
    events: Vec<ProviderEvent>,
    fail_exchange: bool,
    fail_refresh: bool,
    watch_counter: usize,
}

/// Provider double with one calendar, "primary" named "Work".
#[derive(Default)]
pub struct ScriptedProvider {
    state: Mutex<ProviderState>,
}

impl ScriptedProvider {
    pub fn new(now: DateTime<Utc>) -> Self {
        let provider = Self::default();
        provider.state.lock().now = Some(now);
        provider
    }

    pub fn set_events(&self, events: Vec<ProviderEvent>) {
        self.state.lock().events = events;
    }

    pub fn fail_exchange(&self) {
        self.state.lock().fail_exchange = true;
    }

    pub fn fail_refresh(&self) {
        self.state.lock().fail_refresh = true;
    }

    fn token(&self, access: &str) -> OAuthToken {
        let now = self.state.lock().now.unwrap_or_else(Utc::now);
        OAuthToken {
            access_token: access.into(),
            refresh_token: "refresh".into(),
            expiry: now + Duration::hours(1),
            token_type: "Bearer".into(),
            scopes: vec!["calendar".into()],
        }
    }
}

#[async_trait]
impl CalendarProvider for ScriptedProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Google
    }

    fn generate_auth_url(&self, state: &str) -> String {
        format!("https://accounts.example.com/o/oauth2/auth?state={state}")
    }

    async fn exchange_code(&self, code: &str) -> DomainResult<OAuthToken> {
        if self.state.lock().fail_exchange {
            return Err(CalendarError::CodeExchangeFailed("invalid_grant".into()).into());
        }
        Ok(self.token(&format!("access-{code}")))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> DomainResult<OAuthToken> {
        if self.state.lock().fail_refresh {
            return Err(CalendarError::TokenRefreshFailed("invalid_grant".into()).into());
        }
        Ok(self.token("refreshed"))
    }

    async fn get_account_info(&self, _token: &OAuthToken) -> DomainResult<AccountInfo> {
        Ok(AccountInfo {
            id: "me@example.com".into(),
            email: "me@example.com".into(),
            name: "Me".into(),
        })
    }

    async fn list_calendars(&self, _token: &OAuthToken) -> DomainResult<Vec<CalendarInfo>> {
        Ok(vec![CalendarInfo {
            id: "primary".into(),
            name: "Work".into(),
            description: String::new(),
            is_primary: true,
            access_role: "owner".into(),
        }])
    }

    async fn fetch_event_batch(
        &self,
        _token: &OAuthToken,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DomainResult<EventBatch> {
        let events = self
            .state
            .lock()
            .events
            .iter()
            .filter(|event| {
                event.end.with_timezone(&Utc) > from && event.start.with_timezone(&Utc) < to
            })
            .cloned()
            .collect();
        Ok(EventBatch { events, failed_calendars: Vec::new() })
    }

    async fn create_event(
        &self,
        _token: &OAuthToken,
        event: &ProviderEvent,
    ) -> DomainResult<ProviderEvent> {
        Ok(event.clone())
    }

    async fn update_event(
        &self,
        _token: &OAuthToken,
        _event_id: &str,
        event: &ProviderEvent,
    ) -> DomainResult<ProviderEvent> {
        Ok(event.clone())
    }

    async fn delete_event(
        &self,
        _token: &OAuthToken,
        _calendar_id: &str,
        _event_id: &str,
    ) -> DomainResult<()> {
        Ok(())
    }

    async fn watch_calendar(
        &self,
        _token: &OAuthToken,
        calendar_id: &str,
        _channel_id: &str,
        _webhook_url: &str,
    ) -> DomainResult<WatchResponse> {
        let mut state = self.state.lock();
        state.watch_counter += 1;
        let now = state.now.unwrap_or_else(Utc::now);
        Ok(WatchResponse {
            channel_id: format!("ch-{}", state.watch_counter),
            resource_id: format!("res-{calendar_id}"),
            expiration: now + Duration::days(7),
        })
    }

    async fn stop_watch(
        &self,
        _token: &OAuthToken,
        _channel_id: &str,
        _resource_id: &str,
    ) -> DomainResult<()> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub ctx: Arc<AppContext>,
    pub provider: Arc<ScriptedProvider>,
    pub clock: Arc<MockClock>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_webhook_limit(100)
    }

    pub fn with_webhook_limit(max_requests: u32) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let db = Arc::new(
            DbManager::new(dir.path().join("kindred.db"), 4, Some(TEST_DB_KEY)).expect("db"),
        );
        db.run_migrations().expect("migrations");

        let start = Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap();
        let clock = Arc::new(MockClock::at_utc(start));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let provider = Arc::new(ScriptedProvider::new(clock.utc_now()));
        let limiter = Arc::new(
            FixedWindowRateLimiter::new(max_requests, StdDuration::from_secs(60)).expect("limiter"),
        );

        let services = CalendarServices::wire(
            CalendarPorts {
                providers: Arc::new(ProviderRegistry::new().with_provider(provider.clone())),
                connections: Arc::new(SqliteConnectionRepository::new(db.clone())),
                tasks: Arc::new(SqliteTaskStore::new(db.clone())),
                ledger: Arc::new(SqliteProcessedEventLedger::new(db.clone())),
                clock: dyn_clock.clone(),
            },
            limiter,
            "https://api.example.com/v1/calendar/webhook",
        );
        let ctx = Arc::new(AppContext::from_services(
            services,
            Arc::new(GatewayHeaderResolver),
            db,
            dyn_clock,
            APP_REDIRECT,
        ));

        Self { router: router(ctx.clone()), ctx, provider, clock, _dir: dir }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("router is infallible")
    }

    /// Complete the OAuth flow for `user` and return the new connection id.
    pub async fn connect(&self, user: Uuid) -> Uuid {
        self.ctx
            .connections
            .handle_callback("google", "code", &user.to_string())
            .await
            .expect("callback")
            .id
    }

    pub fn event(&self, id: &str, hours_from_now: i64) -> ProviderEvent {
        let start = self.clock.utc_now() + Duration::hours(hours_from_now);
        ProviderEvent {
            id: id.into(),
            calendar_id: "primary".into(),
            calendar_name: "Work".into(),
            summary: format!("Meeting {id}"),
            description: String::new(),
            location: String::new(),
            start: start.fixed_offset(),
            end: (start + Duration::hours(1)).fixed_offset(),
            is_all_day: false,
            attendees: Vec::new(),
            status: "confirmed".into(),
        }
    }
}

pub fn get(uri: &str, user: Option<Uuid>) -> Request<Body> {
    request("GET", uri, user, Body::empty())
}

pub fn request(method: &str, uri: &str, user: Option<Uuid>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user.to_string());
    }
    builder.header("content-type", "application/json").body(body).expect("request")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

pub async fn json_body(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let text = body_text(response).await;
    (status, serde_json::from_str(&text).expect("json body"))
}
