//! The retrying API client itself.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode, Url};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, Level};

use crate::client::auth::{AuthStrategy, NoAuth};
use crate::client::config::{ApiConfig, RateLimitWindow};
use crate::client::error::ApiError;
use crate::client::retry::RetryPolicy;

const ERROR_BODY_LIMIT: usize = 512;

fn truncate_body(body: String) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body;
    }
    let mut cut = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &body[..cut])
}

/// Generic retrying HTTP client for Source/Target implementations.
///
/// One instance per source or target, released with its owner. The
/// per-request flow is: fixed-window rate-limit guard → auth strategy →
/// send → on 401/403 the auth strategy gets one refresh attempt → retryable
/// statuses and connect/timeout errors retried with backoff per the
/// [`RetryPolicy`] → remaining non-2xx mapped to [`ApiError::Status`].
///
/// Call sites inside sources and targets convert the resulting [`ApiError`]
/// with [`into_source_error`](ApiError::into_source_error) /
/// [`into_target_error`](ApiError::into_target_error) so the driver can
/// classify retryability.
pub struct ApiClient {
    config: ApiConfig,
    http: reqwest::Client,
    retry_policy: RetryPolicy,
    auth: Arc<dyn AuthStrategy>,
    rate_limit: Option<Mutex<RateLimitWindow>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl ApiClient {
    /// Build a client over `config` with no auth and the default retry
    /// policy.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidRequest`] for malformed default headers,
    /// [`ApiError::Transport`] if the underlying client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::InvalidRequest(format!("bad header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::InvalidRequest(format!("bad header value: {e}")))?;
            default_headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .default_headers(default_headers);
        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;

        Ok(Self {
            config,
            http,
            retry_policy: RetryPolicy::default(),
            auth: Arc::new(NoAuth),
            rate_limit: None,
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthStrategy>) -> Self {
        self.auth = auth;
        self
    }

    /// Guard outgoing requests with a fixed-window budget.
    #[must_use]
    pub fn with_rate_limit(mut self, window: RateLimitWindow) -> Self {
        self.rate_limit = Some(Mutex::new(window));
        self
    }

    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.send(Method::GET, path, None, None).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Response, ApiError> {
        self.send(Method::POST, path, None, Some(body)).await
    }

    /// Send one request through the guard/auth/retry pipeline.
    ///
    /// # Errors
    ///
    /// See [`ApiError`]; retryable failures are only surfaced after the
    /// policy's attempt budget is spent.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        json: Option<&serde_json::Value>,
    ) -> Result<Response, ApiError> {
        let url = self.url_for(path)?;
        let mut refresh_attempted = false;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.check_rate_limit()?;

            let mut headers = HeaderMap::new();
            self.auth.apply(&mut headers)?;

            let mut request = self.http.request(method.clone(), url.clone()).headers(headers);
            if let Some(query) = query {
                request = request.query(query);
            }
            if let Some(body) = json {
                request = request.json(body);
            }

            let started = Instant::now();
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if self.wire_logging() {
                        debug!(
                            %method,
                            %url,
                            status = status.as_u16(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            attempt,
                            "request completed"
                        );
                    }

                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        if !refresh_attempted
                            && self.auth.handle_unauthorized(status.as_u16()).await?
                        {
                            refresh_attempted = true;
                            continue;
                        }
                        return Err(ApiError::Auth {
                            status: status.as_u16(),
                        });
                    }

                    if self.retry_policy.is_retry_status(status.as_u16()) {
                        if attempt < self.retry_policy.max_attempts() {
                            let delay = self.retry_policy.delay_for(attempt);
                            if self.wire_logging() {
                                debug!(status = status.as_u16(), attempt, ?delay, "retrying");
                            }
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(ApiError::Status {
                            status: status.as_u16(),
                            message: "retry budget exhausted".to_string(),
                        });
                    }

                    if status.is_success() {
                        return Ok(response);
                    }
                    let message = truncate_body(response.text().await.unwrap_or_default());
                    return Err(ApiError::Status {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(err) => {
                    let retryable = err.is_connect() || err.is_timeout();
                    if retryable && attempt < self.retry_policy.max_attempts() {
                        let delay = self.retry_policy.delay_for(attempt);
                        if self.wire_logging() {
                            debug!(error = %err, attempt, ?delay, "transport error, retrying");
                        }
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(ApiError::Transport(err));
                }
            }
        }
    }

    fn url_for(&self, path: &str) -> Result<Url, ApiError> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };
        Url::parse(&raw).map_err(|e| ApiError::InvalidRequest(format!("bad url '{raw}': {e}")))
    }

    /// Whether this client's configured level admits per-request telemetry.
    fn wire_logging(&self) -> bool {
        self.config.log_level >= Level::DEBUG
    }

    fn check_rate_limit(&self) -> Result<(), ApiError> {
        let Some(limiter) = &self.rate_limit else {
            return Ok(());
        };
        let mut window = limiter.lock().unwrap_or_else(PoisonError::into_inner);
        if !window.can_request() {
            return Err(ApiError::RateLimited);
        }
        window.register_request();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_truncation_respects_char_boundaries() {
        let short = "ok".to_string();
        assert_eq!(truncate_body(short.clone()), short);

        let long = "é".repeat(ERROR_BODY_LIMIT);
        let cut = truncate_body(long);
        assert!(cut.len() <= ERROR_BODY_LIMIT + '…'.len_utf8());
        assert!(cut.ends_with('…'));
    }
}
