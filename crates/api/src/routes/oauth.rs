//! OAuth consent callback

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::context::AppContext;

pub fn router() -> Router<Arc<AppContext>> {
    Router::new().route("/v1/calendar/oauth2/callback", get(callback))
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /v1/calendar/oauth2/callback - Google redirects the browser here.
///
/// Always answers 200 with a page that bounces into the app; the deep link
/// tells the app whether the user declined or our side failed.
async fn callback(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    let scheme = ctx.app_redirect.trim_end_matches('/');

    if let Some(reason) = params.error.as_deref() {
        warn!(reason, "provider declined calendar consent");
        return redirect_page(&format!(
            "{scheme}/error?message=provider_declined&reason={}",
            urlencoding::encode(reason)
        ));
    }

    let (Some(code), Some(state)) = (params.code.as_deref(), params.state.as_deref()) else {
        warn!("oauth callback without code or state");
        return redirect_page(&format!("{scheme}/error?message=connection_failed"));
    };

    match ctx.connections.handle_callback("google", code, state).await {
        Ok(connection) => {
            info!(connection_id = %connection.id, "calendar linked");
            redirect_page(&format!("{scheme}/linked?connectionId={}", connection.id))
        }
        Err(err) => {
            error!(kind = err.kind(), error = %err, "calendar connection failed");
            redirect_page(&format!("{scheme}/error?message=connection_failed"))
        }
    }
}

fn redirect_page(url: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta http-equiv="refresh" content="0;url={url}">
    <title>Kindred Calendar</title>
</head>
<body>
    <p>Returning to Kindred&hellip; <a href="{url}">Continue</a></p>
</body>
</html>"#
    ))
}
