//! HTTP error responses
//!
//! Every handler returns `Result<_, ApiError>`; the error renders as
//! `{ "error": <kind>, "message": <text> }` with a status derived from the
//! error kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kindred_domain::{CalendarError, KindredError};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub KindredError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

impl From<KindredError> for ApiError {
    fn from(err: KindredError) -> Self {
        Self(err)
    }
}

impl From<CalendarError> for ApiError {
    fn from(err: CalendarError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!(kind = self.0.kind(), error = %self.0, "request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(ErrorBody { error: self.0.kind(), message })).into_response()
    }
}

pub fn status_for(err: &KindredError) -> StatusCode {
    match err {
        KindredError::Calendar(calendar) => match calendar {
            CalendarError::InvalidState(_)
            | CalendarError::MalformedConnectionId(_)
            | CalendarError::UnsupportedProvider(_)
            | CalendarError::ProviderDeclined(_) => StatusCode::BAD_REQUEST,
            CalendarError::UnknownWatchChannel { .. } => StatusCode::FORBIDDEN,
            CalendarError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            // The grant is gone; the user has to reconnect.
            CalendarError::TokenRefreshFailed(_) => StatusCode::CONFLICT,
            CalendarError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            CalendarError::CodeExchangeFailed(_)
            | CalendarError::AccountInfoFailed(_)
            | CalendarError::CalendarListFailed(_)
            | CalendarError::EventFetchFailed { .. }
            | CalendarError::WatchRegistrationFailed(_) => StatusCode::BAD_GATEWAY,
            CalendarError::CategoryNotFoundForCalendar(_)
            | CalendarError::TaskWriteConflict(_)
            | CalendarError::TaskWriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        KindredError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        KindredError::Auth(_) => StatusCode::UNAUTHORIZED,
        KindredError::NotFound(_) => StatusCode::NOT_FOUND,
        KindredError::Database(_)
        | KindredError::Config(_)
        | KindredError::Network(_)
        | KindredError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
