//! Authenticated calendar connection endpoints

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use kindred_common::time::symmetric_window;
use kindred_domain::constants::DEFAULT_EVENT_WINDOW_DAYS;
use kindred_domain::{
    CalendarConnection, CalendarError, CalendarInfo, Category, KindredError, ProviderEvent,
    Result, SyncResult,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::identity::CurrentUser;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/v1/user/calendar/connect/{provider}", get(connect))
        .route("/v1/user/calendar/connections", get(list_connections))
        .route("/v1/user/calendar/connections/{id}", delete(disconnect))
        .route("/v1/user/calendar/connections/{id}/calendars", get(list_calendars))
        .route("/v1/user/calendar/connections/{id}/setup", post(setup_workspaces))
        .route("/v1/user/calendar/connections/{id}/events", get(list_events))
        .route("/v1/user/calendar/connections/{id}/sync", post(sync_events))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub auth_url: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<CalendarConnection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CalendarsResponse {
    pub calendars: Vec<CalendarInfo>,
}

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub calendar_ids: Vec<String>,
    #[serde(default)]
    pub merge_into_one: bool,
}

#[derive(Debug, Serialize)]
pub struct SetupResponse {
    pub success: bool,
    pub categories_created: usize,
    pub categories: Vec<Category>,
}

/// Optional RFC3339 bounds of the events and sync windows.
#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Provider-neutral event with RFC3339 string times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDto {
    pub id: String,
    pub calendar_id: String,
    pub calendar_name: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub is_all_day: bool,
    pub attendees: Vec<String>,
    pub status: String,
}

impl From<ProviderEvent> for EventDto {
    fn from(event: ProviderEvent) -> Self {
        Self {
            start_time: event.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end_time: event.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            id: event.id,
            calendar_id: event.calendar_id,
            calendar_name: event.calendar_name,
            summary: event.summary,
            description: event.description,
            location: event.location,
            is_all_day: event.is_all_day,
            attendees: event.attendees,
            status: event.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventDto>,
}

/// GET /v1/user/calendar/connect/{provider} - consent URL to open
async fn connect(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user_id): CurrentUser,
    Path(provider): Path<String>,
) -> ApiResult<ConnectResponse> {
    let auth_url = ctx.connections.initiate_oauth(&provider, user_id)?;
    Ok(Json(ConnectResponse { auth_url }))
}

/// GET /v1/user/calendar/connections
async fn list_connections(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<ConnectionsResponse> {
    let connections = ctx.connections.list_connections(user_id).await?;
    Ok(Json(ConnectionsResponse { connections }))
}

/// DELETE /v1/user/calendar/connections/{id}
async fn disconnect(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<MessageResponse> {
    let connection_id = parse_connection_id(&id)?;
    ctx.connections.disconnect(user_id, connection_id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Calendar disconnected successfully".into(),
    }))
}

/// GET /v1/user/calendar/connections/{id}/calendars
async fn list_calendars(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<CalendarsResponse> {
    let connection_id = parse_connection_id(&id)?;
    let calendars = ctx.connections.list_calendars(user_id, connection_id).await?;
    Ok(Json(CalendarsResponse { calendars }))
}

/// POST /v1/user/calendar/connections/{id}/setup
async fn setup_workspaces(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    payload: std::result::Result<Json<SetupRequest>, JsonRejection>,
) -> ApiResult<SetupResponse> {
    let connection_id = parse_connection_id(&id)?;
    let Json(request) =
        payload.map_err(|rejection| KindredError::InvalidInput(rejection.body_text()))?;

    let categories = ctx
        .connections
        .setup_workspaces(user_id, connection_id, &request.calendar_ids, request.merge_into_one)
        .await?;
    info!(%connection_id, created = categories.len(), "calendar workspaces set up");

    Ok(Json(SetupResponse { success: true, categories_created: categories.len(), categories }))
}

/// GET /v1/user/calendar/connections/{id}/events?start&end
async fn list_events(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Query(window): Query<WindowQuery>,
) -> ApiResult<EventsResponse> {
    let connection_id = parse_connection_id(&id)?;
    let (from, to) = resolve_window(&window, ctx.clock.utc_now())?;

    let events = ctx.sync.fetch_events(connection_id, user_id, from, to).await?;
    Ok(Json(EventsResponse { events: events.into_iter().map(EventDto::from).collect() }))
}

/// POST /v1/user/calendar/connections/{id}/sync?start&end - runs inline
async fn sync_events(
    State(ctx): State<Arc<AppContext>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Query(window): Query<WindowQuery>,
) -> ApiResult<SyncResult> {
    let connection_id = parse_connection_id(&id)?;
    let (from, to) = resolve_window(&window, ctx.clock.utc_now())?;

    let result = ctx.sync.sync_events_to_tasks(connection_id, user_id, from, to).await?;
    Ok(Json(result))
}

fn parse_connection_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| CalendarError::MalformedConnectionId(raw.to_string()).into())
}

/// Missing bounds default to `now ± DEFAULT_EVENT_WINDOW_DAYS`.
fn resolve_window(
    query: &WindowQuery,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (default_from, default_to) = symmetric_window(now, DEFAULT_EVENT_WINDOW_DAYS);
    let from = parse_bound("start", query.start.as_deref())?.unwrap_or(default_from);
    let to = parse_bound("end", query.end.as_deref())?.unwrap_or(default_to);

    if from > to {
        return Err(KindredError::InvalidInput("start must not be after end".into()));
    }
    Ok((from, to))
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(|_| {
                KindredError::InvalidInput(format!("invalid {name} date format, use RFC3339"))
            }),
    }
}
