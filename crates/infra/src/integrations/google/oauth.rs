//! Google OAuth 2.0 authorization-code flow for calendar access.

use std::sync::Arc;

use chrono::Duration;
use kindred_common::Clock;
use kindred_domain::{GoogleCalendarConfig, KindredError, OAuthToken, Result};
use reqwest::Method;
use tracing::{info, instrument, warn};
use url::Url;

use super::types::TokenResponse;
use crate::http::HttpClient;

pub const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

pub const GOOGLE_CALENDAR_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// OAuth client settings for Google.
#[derive(Clone)]
pub struct GoogleOAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub scopes: Vec<String>,
}

impl GoogleOAuthSettings {
    /// Settings for the public Google endpoints.
    pub fn from_config(config: &GoogleCalendarConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            authorization_endpoint: GOOGLE_AUTH_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            scopes: GOOGLE_CALENDAR_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Point the token endpoint elsewhere (tests, proxies).
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }
}

impl std::fmt::Debug for GoogleOAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_url", &self.redirect_url)
            .field("token_endpoint", &self.token_endpoint)
            .finish_non_exhaustive()
    }
}

/// Builds consent URLs and talks to the token endpoint.
pub struct GoogleOAuthClient {
    settings: GoogleOAuthSettings,
    authorization_endpoint: Url,
    http: HttpClient,
    clock: Arc<dyn Clock>,
}

impl GoogleOAuthClient {
    /// # Errors
    /// `KindredError::Config` if the authorization endpoint is not a URL.
    pub fn new(settings: GoogleOAuthSettings, http: HttpClient, clock: Arc<dyn Clock>) -> Result<Self> {
        let authorization_endpoint = Url::parse(&settings.authorization_endpoint).map_err(|e| {
            KindredError::Config(format!("invalid authorization endpoint: {e}"))
        })?;
        Ok(Self { settings, authorization_endpoint, http, clock })
    }

    /// Consent URL requesting offline access; `state` is echoed back on the
    /// callback.
    pub fn authorization_url(&self, state: &str) -> String {
        let mut url = self.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.settings.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);

        url.into()
    }

    /// Exchange an authorization code for tokens.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthToken> {
        let form = [
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("redirect_uri", self.settings.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self.request_token(&form).await?;
        let token = self.into_token(response, None);
        info!(
            has_refresh_token = !token.refresh_token.is_empty(),
            expiry = %token.expiry,
            "google authorization code exchanged"
        );
        Ok(token)
    }

    /// Obtain a new access token. The returned refresh token is the new one
    /// if Google rotated it, otherwise `refresh_token`.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken> {
        if refresh_token.is_empty() {
            return Err(KindredError::Auth("no refresh token stored".into()));
        }

        let form = [
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self.request_token(&form).await?;
        Ok(self.into_token(response, Some(refresh_token)))
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let builder = self.http.request(Method::POST, &self.settings.token_endpoint).form(form);
        self.http.send_json::<TokenResponse>(builder).await.map_err(|err| {
            warn!(error = %err, "google token endpoint rejected request");
            err
        })
    }

    fn into_token(&self, response: TokenResponse, previous_refresh: Option<&str>) -> OAuthToken {
        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let refresh_token = response
            .refresh_token
            .filter(|token| !token.is_empty())
            .or_else(|| previous_refresh.map(str::to_string))
            .unwrap_or_default();

        OAuthToken {
            access_token: response.access_token,
            refresh_token,
            expiry: self.clock.utc_now() + Duration::seconds(lifetime),
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scopes: response
                .scope
                .map(|scope| scope.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(|| self.settings.scopes.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration as StdDuration;

    use chrono::{TimeZone, Utc};
    use kindred_common::MockClock;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config() -> GoogleCalendarConfig {
        GoogleCalendarConfig {
            client_id: "client-123".into(),
            client_secret: "shh".into(),
            redirect_url: "https://api.example.com/v1/calendar/oauth2/callback".into(),
            webhook_base_url: "https://api.example.com/v1/calendar/webhook".into(),
        }
    }

    fn client(token_endpoint: String) -> (GoogleOAuthClient, Arc<MockClock>) {
        let clock = Arc::new(MockClock::at_utc(Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()));
        let http = HttpClient::builder()
            .max_attempts(1)
            .timeout(StdDuration::from_secs(5))
            .build()
            .unwrap();
        let settings = GoogleOAuthSettings::from_config(&config()).with_token_endpoint(token_endpoint);
        (GoogleOAuthClient::new(settings, http, clock.clone()).unwrap(), clock)
    }

    #[test]
    fn authorization_url_requests_offline_consent() {
        let (client, _) = client("http://unused".into());
        let raw = client.authorization_url("0190a7d2-user");
        let url = Url::parse(&raw).unwrap();
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert!(raw.starts_with(GOOGLE_AUTH_ENDPOINT));
        assert_eq!(query["state"], "0190a7d2-user");
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["prompt"], "consent");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-123");
        assert!(query["scope"].contains("calendar.readonly"));
        assert!(query["scope"].contains("calendar.events"));
    }

    #[tokio::test]
    async fn exchange_code_computes_expiry_from_clock() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.access",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "token_type": "Bearer",
                "scope": "https://www.googleapis.com/auth/calendar.readonly"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, clock) = client(format!("{}/token", server.uri()));
        let token = client.exchange_code("auth-code").await.unwrap();

        assert_eq!(token.access_token, "ya29.access");
        assert_eq!(token.refresh_token, "1//refresh");
        assert_eq!(token.expiry, clock.utc_now() + Duration::seconds(3599));
        assert_eq!(token.scopes, vec!["https://www.googleapis.com/auth/calendar.readonly"]);
    }

    #[tokio::test]
    async fn refresh_keeps_previous_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let (client, _) = client(format!("{}/token", server.uri()));
        let token = client.refresh("1//stored").await.unwrap();

        assert_eq!(token.access_token, "ya29.fresh");
        assert_eq!(token.refresh_token, "1//stored");
        assert_eq!(token.token_type, "Bearer");
    }

    #[tokio::test]
    async fn invalid_grant_surfaces_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let (client, _) = client(format!("{}/token", server.uri()));
        let err = client.refresh("1//revoked").await.unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn refresh_without_token_fails_fast() {
        let (client, _) = client("http://127.0.0.1:9/token".into());
        let err = client.refresh("").await.unwrap_err();
        assert_eq!(err.kind(), "unauthenticated");
    }
}
