//! Push notifications from Google

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use kindred_core::calendar::{WebhookNotification, WebhookOutcome};
use serde_json::{json, Value};
use tracing::debug;

use crate::context::AppContext;
use crate::error::ApiError;

pub const CHANNEL_ID_HEADER: &str = "x-goog-channel-id";
pub const RESOURCE_ID_HEADER: &str = "x-goog-resource-id";
pub const RESOURCE_STATE_HEADER: &str = "x-goog-resource-state";
pub const RESOURCE_URI_HEADER: &str = "x-goog-resource-uri";
pub const MESSAGE_NUMBER_HEADER: &str = "x-goog-message-number";
pub const CHANNEL_TOKEN_HEADER: &str = "x-goog-channel-token";

pub fn router() -> Router<Arc<AppContext>> {
    Router::new().route("/v1/calendar/webhook/{connection_id}", post(notify))
}

/// POST /v1/calendar/webhook/{connection_id} - the body is ignored.
async fn notify(
    State(ctx): State<Arc<AppContext>>,
    Path(connection_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let notification = notification_from_headers(&headers);
    debug!(
        connection_id = %connection_id,
        resource_state = %notification.resource_state,
        message_number = ?notification.message_number,
        "webhook received"
    );

    // Dropping the handle detaches the sync; its errors are only logged.
    if let WebhookOutcome::SyncScheduled(_) =
        ctx.webhooks.handle_notification(&connection_id, &notification).await?
    {
        debug!(connection_id = %connection_id, "background sync launched");
    }

    Ok(Json(json!({ "success": true })))
}

pub fn notification_from_headers(headers: &HeaderMap) -> WebhookNotification {
    let text = |name: &str| {
        headers.get(name).and_then(|value| value.to_str().ok()).map(|value| value.trim().to_string())
    };

    WebhookNotification {
        channel_id: text(CHANNEL_ID_HEADER).unwrap_or_default(),
        resource_id: text(RESOURCE_ID_HEADER).unwrap_or_default(),
        resource_state: text(RESOURCE_STATE_HEADER).unwrap_or_default(),
        resource_uri: text(RESOURCE_URI_HEADER),
        message_number: text(MESSAGE_NUMBER_HEADER),
        channel_token: text(CHANNEL_TOKEN_HEADER),
    }
}
