//! Static configuration and dynamic state for the API client.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::{Duration, Instant};
use tracing::Level;

/// Base settings for one API client instance.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Headers attached to every request (e.g. `User-Agent`).
    pub default_headers: Vec<(String, String)>,
    pub verify_tls: bool,
    /// Verbosity ceiling for this client's own request telemetry.
    ///
    /// Per-request wire events (status, latency, retries) are emitted only
    /// when the level admits `DEBUG`. The default of `ERROR` keeps clients
    /// quiet regardless of the global subscriber filter.
    pub log_level: Level,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            default_headers: Vec::new(),
            verify_tls: true,
            log_level: Level::ERROR,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    #[must_use]
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }
}

/// Static authorization material (everything except the access token).
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_client_creds(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    #[must_use]
    pub fn has_login_password(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Dynamic authorization state for refreshable bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub access_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_required: bool,
}

impl AuthState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_for_refresh(&mut self) {
        self.refresh_required = true;
    }

    pub fn set_token(&mut self, token: impl Into<String>, lifetime: Option<ChronoDuration>) {
        self.access_token = Some(token.into());
        self.refresh_required = false;
        self.expires_at = lifetime.map(|lifetime| Utc::now() + lifetime);
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.refresh_required || self.access_token.is_none() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

/// Fixed-window request budget.
///
/// The window rolls over lazily: the first check after `window` has elapsed
/// resets the counter.
#[derive(Debug)]
pub struct RateLimitWindow {
    limit_per_window: u32,
    window: Duration,
    window_start: Instant,
    used_in_window: u32,
}

impl RateLimitWindow {
    #[must_use]
    pub fn new(limit_per_window: u32, window: Duration) -> Self {
        Self {
            limit_per_window,
            window,
            window_start: Instant::now(),
            used_in_window: 0,
        }
    }

    #[must_use]
    pub fn can_request(&mut self) -> bool {
        self.can_request_at(Instant::now())
    }

    pub fn register_request(&mut self) {
        self.register_request_at(Instant::now());
    }

    #[must_use]
    pub fn can_request_at(&mut self, now: Instant) -> bool {
        self.maybe_roll_window(now);
        self.used_in_window < self.limit_per_window
    }

    pub fn register_request_at(&mut self, now: Instant) {
        self.maybe_roll_window(now);
        self.used_in_window += 1;
    }

    fn maybe_roll_window(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.used_in_window = 0;
        }
    }
}
