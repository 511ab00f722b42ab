//! # Kindred API
//!
//! HTTP layer of the calendar engine.
//!
//! This crate contains:
//! - axum routes for connections, sync, the OAuth callback and webhooks
//! - Application context (dependency injection)
//! - Identity resolution and error-to-status mapping
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod context;
pub mod error;
pub mod identity;
pub mod routes;
pub mod utils;

pub use context::{AppContext, CalendarPorts, CalendarServices, HealthCheck};
pub use error::ApiError;
pub use identity::{CurrentUser, GatewayHeaderResolver, IdentityResolver};
pub use routes::router;
