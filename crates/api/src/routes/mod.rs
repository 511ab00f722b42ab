//! HTTP routes
//!
//! User routes live under `/v1/user/calendar` and require an identity.
//! The OAuth callback and the webhook are called by Google directly and are
//! authenticated by the OAuth state and the channel headers respectively.

pub mod connections;
pub mod oauth;
pub mod webhook;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::context::AppContext;
use crate::error::ApiError;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(connections::router())
        .merge(oauth::router())
        .merge(webhook::router())
        .with_state(ctx)
}

/// GET /health - database reachability
async fn health(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, ApiError> {
    ctx.health.check()?;
    Ok(Json(json!({ "status": "ok" })))
}
