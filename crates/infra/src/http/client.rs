use std::time::Duration;

use kindred_domain::{KindredError, Result as DomainResult};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::InfraError;

/// Longest provider error body kept in error messages.
const ERROR_BODY_LIMIT: usize = 512;

/// HTTP client for provider REST APIs with retry and timeout support.
///
/// Server errors, 429 and transport failures are retried with exponential
/// backoff. Other statuses are returned on the first attempt.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: usize,
    base_backoff: Duration,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Client with the default timeout and retry policy.
    pub fn new() -> DomainResult<Self> {
        Self::builder().build()
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute `builder`, retrying transient failures.
    ///
    /// Returns the last response even when its status is an error; use
    /// [`HttpClient::send_json`] or [`HttpClient::send_empty`] to have
    /// non-success statuses mapped to errors.
    pub async fn send(&self, builder: RequestBuilder) -> DomainResult<Response> {
        let attempts = self.max_attempts.max(1);

        for attempt in 0..attempts {
            let request = builder
                .try_clone()
                .ok_or_else(|| {
                    KindredError::Internal("streaming request bodies cannot be retried".into())
                })?
                .build()
                .map_err(|err| KindredError::from(InfraError::from(err)))?;

            let method = request.method().clone();
            let url = redacted_url(request.url());
            let is_last = attempt + 1 == attempts;

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt = attempt + 1, %method, %url, %status, "provider response");

                    if is_retryable_status(status) && !is_last {
                        self.sleep_with_backoff(attempt + 1).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, %method, %url, error = %err, "provider request failed");

                    if !is_last && should_retry_error(&err) {
                        self.sleep_with_backoff(attempt + 1).await;
                        continue;
                    }

                    return Err(InfraError::from(err).into());
                }
            }
        }

        Err(KindredError::Internal("http client exhausted retries without a response".into()))
    }

    /// Execute `builder` and decode a JSON body from a 2xx response.
    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> DomainResult<T> {
        let response = ensure_success(self.send(builder).await?).await?;
        response.json::<T>().await.map_err(|err| InfraError::from(err).into())
    }

    /// Execute `builder` and discard the body of a 2xx response.
    pub async fn send_empty(&self, builder: RequestBuilder) -> DomainResult<()> {
        ensure_success(self.send(builder).await?).await.map(|_| ())
    }

    fn backoff_delay(&self, retry_number: usize) -> Duration {
        let shift = retry_number.saturating_sub(1).min(8) as u32;
        self.base_backoff.saturating_mul(1u32 << shift)
    }

    async fn sleep_with_backoff(&self, retry_number: usize) {
        let delay = self.backoff_delay(retry_number);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    user_agent: String,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            user_agent: concat!("kindred-calendar/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total number of attempts (initial try + retries).
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn build(self) -> DomainResult<HttpClient> {
        let client = ReqwestClient::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .no_proxy()
            .build()
            .map_err(|err| KindredError::from(InfraError::from(err)))?;

        Ok(HttpClient {
            client,
            max_attempts: self.max_attempts.max(1),
            base_backoff: self.base_backoff,
        })
    }
}

/// Map a non-2xx response to a domain error carrying the provider's message.
async fn ensure_success(response: Response) -> DomainResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let mut detail: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    if detail.trim().is_empty() {
        detail = status.canonical_reason().unwrap_or("unknown status").to_string();
    }
    let message = format!("HTTP {}: {}", status.as_u16(), detail.trim());
    warn!(status = status.as_u16(), "provider returned an error status");

    Err(match status.as_u16() {
        401 | 403 => KindredError::Auth(message),
        404 | 410 => KindredError::NotFound(message),
        400..=499 => KindredError::InvalidInput(message),
        _ => KindredError::Network(message),
    })
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// URL without its query string; OAuth codes and tokens travel there.
fn redacted_url(url: &reqwest::Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
