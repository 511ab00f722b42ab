//! Caller identity for authenticated routes

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use kindred_domain::{KindredError, Result};
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::ApiError;

/// Header set by the upstream auth gateway.
pub const USER_ID_HEADER: &str = "x-kindred-user-id";

/// Yields the authenticated user of a request.
pub trait IdentityResolver: Send + Sync {
    /// `KindredError::Auth` when the request carries no usable identity.
    fn resolve(&self, headers: &HeaderMap) -> Result<Uuid>;
}

/// Trusts the user id forwarded by the gateway in [`USER_ID_HEADER`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GatewayHeaderResolver;

impl IdentityResolver for GatewayHeaderResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<Uuid> {
        let raw = headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| KindredError::Auth("missing user identity".into()))?
            .to_str()
            .map_err(|_| KindredError::Auth("user identity is not valid text".into()))?;

        Uuid::parse_str(raw.trim())
            .map_err(|_| KindredError::Auth("user identity is not a valid id".into()))
    }
}

/// Extractor for the authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

impl FromRequestParts<Arc<AppContext>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<AppContext>,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(Self(ctx.identity.resolve(&parts.headers)?))
    }
}
