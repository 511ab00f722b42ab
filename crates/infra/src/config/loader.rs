//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Environment variables, when every required one is set
//! 2. Otherwise the first config file found by [`probe_config_paths`]
//!
//! ## Environment Variables
//! Required:
//! - `KINDRED_DB_PATH`
//! - `KINDRED_GOOGLE_CLIENT_ID`, `KINDRED_GOOGLE_CLIENT_SECRET`
//! - `KINDRED_GOOGLE_REDIRECT_URL`, `KINDRED_WEBHOOK_BASE_URL`
//!
//! Optional (defaults in parentheses):
//! - `KINDRED_BIND_ADDR` (`0.0.0.0:8080`)
//! - `KINDRED_APP_REDIRECT_SCHEME` (`kindred://calendar`)
//! - `KINDRED_DB_POOL_SIZE` (8), `KINDRED_DB_ENCRYPTION_KEY`
//! - `KINDRED_WEBHOOK_MAX_REQUESTS` (10), `KINDRED_WEBHOOK_WINDOW_SECS` (60)
//! - `KINDRED_WATCH_RENEWAL_ENABLED` (true)
//! - `KINDRED_WATCH_RENEWAL_CRON` (`0 0 3 * * *`)
//!
//! ## File Locations
//! `config.{toml,json}` and `kindred.{toml,json}` in the working directory,
//! its parent, and next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use kindred_domain::{
    Config, DatabaseConfig, GoogleCalendarConfig, KindredError, Result, ServerConfig,
    WatchRenewalConfig, WebhookConfig,
};

const CONFIG_FILE_NAMES: [&str; 4] = ["config.toml", "config.json", "kindred.toml", "kindred.json"];

/// Load configuration from the environment, falling back to a config file.
///
/// # Errors
/// Returns `KindredError::Config` if neither source yields a complete,
/// valid configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "environment configuration incomplete, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `KINDRED_*` environment variables.
///
/// # Errors
/// Returns `KindredError::Config` when a required variable is missing or a
/// numeric variable does not parse.
pub fn load_from_env() -> Result<Config> {
    let defaults_server = ServerConfig::default();
    let defaults_webhook = WebhookConfig::default();
    let defaults_renewal = WatchRenewalConfig::default();

    let database = DatabaseConfig {
        path: env_var("KINDRED_DB_PATH")?,
        pool_size: env_parse("KINDRED_DB_POOL_SIZE", 8)?,
        encryption_key: std::env::var("KINDRED_DB_ENCRYPTION_KEY").ok(),
    };

    let google = GoogleCalendarConfig {
        client_id: env_var("KINDRED_GOOGLE_CLIENT_ID")?,
        client_secret: env_var("KINDRED_GOOGLE_CLIENT_SECRET")?,
        redirect_url: env_var("KINDRED_GOOGLE_REDIRECT_URL")?,
        webhook_base_url: env_var("KINDRED_WEBHOOK_BASE_URL")?,
    };

    Ok(Config {
        server: ServerConfig {
            bind_addr: env_or("KINDRED_BIND_ADDR", defaults_server.bind_addr),
            app_redirect: env_or("KINDRED_APP_REDIRECT_SCHEME", defaults_server.app_redirect),
        },
        database,
        google,
        webhook: WebhookConfig {
            max_requests: env_parse("KINDRED_WEBHOOK_MAX_REQUESTS", defaults_webhook.max_requests)?,
            window_seconds: env_parse(
                "KINDRED_WEBHOOK_WINDOW_SECS",
                defaults_webhook.window_seconds,
            )?,
            sweep_interval_seconds: defaults_webhook.sweep_interval_seconds,
        },
        renewal: WatchRenewalConfig {
            enabled: env_bool("KINDRED_WATCH_RENEWAL_ENABLED", defaults_renewal.enabled),
            cron: env_or("KINDRED_WATCH_RENEWAL_CRON", defaults_renewal.cron),
            lookahead_hours: defaults_renewal.lookahead_hours,
        },
    })
}

/// Load configuration from a file.
///
/// If `path` is `None`, the standard locations are probed.
///
/// # Errors
/// Returns `KindredError::Config` if the file is missing, unreadable, or
/// invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(KindredError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            KindredError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| KindredError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse by file extension (`.toml` or `.json`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| KindredError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| KindredError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(KindredError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.join(".."));
        roots.insert(0, cwd);
    }

    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| KindredError::Config(format!("Missing required environment variable: {key}")))
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| KindredError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
