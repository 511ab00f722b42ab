//! Configuration structures
//!
//! Loaded by `kindred_infra::config` from the environment or a TOML/JSON file.

use serde::{Deserialize, Serialize};

use crate::constants::{
    RATE_LIMIT_SWEEP_INTERVAL_SECS, WATCH_RENEWAL_LOOKAHEAD_HOURS, WEBHOOK_MAX_REQUESTS,
    WEBHOOK_WINDOW_SECS,
};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub google: GoogleCalendarConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub renewal: WatchRenewalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Deep-link prefix the OAuth callback page redirects to.
    #[serde(default = "default_app_redirect")]
    pub app_redirect: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr(), app_redirect: default_app_redirect() }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    pub encryption_key: Option<String>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("path", &self.path)
            .field("pool_size", &self.pool_size)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Google OAuth client and push-notification settings
#[derive(Clone, Serialize, Deserialize)]
pub struct GoogleCalendarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    /// Base of the webhook route; the connection id is appended.
    pub webhook_base_url: String,
}

impl std::fmt::Debug for GoogleCalendarConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleCalendarConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_url", &self.redirect_url)
            .field("webhook_base_url", &self.webhook_base_url)
            .finish()
    }
}

/// Inbound webhook admission control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

/// Watch channel renewal job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchRenewalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_renewal_cron")]
    pub cron: String,
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: i64,
}

impl Default for WatchRenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_renewal_cron(),
            lookahead_hours: default_lookahead_hours(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_app_redirect() -> String {
    "kindred://calendar".to_string()
}

const fn default_pool_size() -> u32 {
    8
}

const fn default_max_requests() -> u32 {
    WEBHOOK_MAX_REQUESTS
}

const fn default_window_seconds() -> u64 {
    WEBHOOK_WINDOW_SECS
}

const fn default_sweep_interval() -> u64 {
    RATE_LIMIT_SWEEP_INTERVAL_SECS
}

const fn default_true() -> bool {
    true
}

fn default_renewal_cron() -> String {
    "0 0 3 * * *".to_string()
}

const fn default_lookahead_hours() -> i64 {
    WATCH_RENEWAL_LOOKAHEAD_HOURS
}
