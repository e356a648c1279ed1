//! Authorization strategies for the API client.
//!
//! Every strategy draws its material from [`Credentials`]: static schemes
//! (an API key in a fixed header) prepare their header value once at
//! construction, while dynamic schemes additionally carry an [`AuthState`]
//! and get one refresh opportunity when the server answers 401/403.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use crate::client::config::{AuthState, Credentials};
use crate::client::error::ApiError;

/// Async callback that exchanges the stored [`Credentials`] (refresh token,
/// client id/secret, or login/password) for a fresh access token and its
/// lifetime.
pub type TokenRefresher = dyn Fn(Credentials) -> BoxFuture<'static, Result<(String, Option<ChronoDuration>), ApiError>>
    + Send
    + Sync;

/// How requests get their authorization headers.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attach authorization headers to an outgoing request.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidRequest`] when the material cannot form a valid
    /// header value.
    fn apply(&self, headers: &mut HeaderMap) -> Result<(), ApiError>;

    /// React to a 401/403 response.
    ///
    /// Return `Ok(true)` if the strategy refreshed its material and the
    /// request should be retried once; the client asks at most once per
    /// request.
    async fn handle_unauthorized(&self, _status: u16) -> Result<bool, ApiError> {
        Ok(false)
    }
}

/// No authorization at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthStrategy for NoAuth {
    fn apply(&self, _headers: &mut HeaderMap) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Static API key sent in a fixed header (e.g. `X-Api-Key`).
pub struct ApiKeyHeaderAuth {
    header: HeaderName,
    value: HeaderValue,
}

impl std::fmt::Debug for ApiKeyHeaderAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyHeaderAuth")
            .field("header", &self.header)
            .finish()
    }
}

impl ApiKeyHeaderAuth {
    /// Build from the `api_key` stored in `credentials`.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidRequest`] when the credentials carry no API key,
    /// or when the header name or key contains characters illegal in HTTP
    /// headers.
    pub fn new(header: &str, credentials: &Credentials) -> Result<Self, ApiError> {
        let key = credentials
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::InvalidRequest("credentials carry no api_key".to_string()))?;
        let header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| ApiError::InvalidRequest(format!("bad header name '{header}': {e}")))?;
        let mut value = HeaderValue::from_str(key)
            .map_err(|e| ApiError::InvalidRequest(format!("bad api key value: {e}")))?;
        value.set_sensitive(true);
        Ok(Self { header, value })
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyHeaderAuth {
    fn apply(&self, headers: &mut HeaderMap) -> Result<(), ApiError> {
        headers.insert(self.header.clone(), self.value.clone());
        Ok(())
    }
}

/// Bearer token read from an [`AuthState`], optionally refreshable.
///
/// Without a refresher this behaves like the static strategies: the token
/// is applied as-is and a 401/403 propagates. With a refresher, the first
/// 401/403 of a request hands the stored [`Credentials`] to the callback
/// for one refresh and one retry.
pub struct BearerTokenAuth {
    credentials: Credentials,
    state: Mutex<AuthState>,
    refresher: Option<Box<TokenRefresher>>,
}

impl std::fmt::Debug for BearerTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuth")
            .field("refreshable", &self.refresher.is_some())
            .finish()
    }
}

impl BearerTokenAuth {
    #[must_use]
    pub fn new(credentials: Credentials, state: AuthState) -> Self {
        Self {
            credentials,
            state: Mutex::new(state),
            refresher: None,
        }
    }

    /// Attach the refresh callback invoked on 401/403. The callback
    /// receives a copy of this strategy's [`Credentials`].
    #[must_use]
    pub fn with_refresher<F, Fut>(mut self, refresher: F) -> Self
    where
        F: Fn(Credentials) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(String, Option<ChronoDuration>), ApiError>> + Send + 'static,
    {
        self.refresher = Some(Box::new(move |credentials| refresher(credentials).boxed()));
        self
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuthStrategy for BearerTokenAuth {
    fn apply(&self, headers: &mut HeaderMap) -> Result<(), ApiError> {
        let state = self.lock_state();
        let Some(token) = &state.access_token else {
            return Ok(());
        };
        if headers.contains_key(AUTHORIZATION) {
            return Ok(());
        }
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ApiError::InvalidRequest(format!("bad bearer token: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    async fn handle_unauthorized(&self, status: u16) -> Result<bool, ApiError> {
        let Some(refresher) = &self.refresher else {
            self.lock_state().mark_for_refresh();
            return Ok(false);
        };
        tracing::warn!(status, "auth rejected, refreshing access token");
        let (token, lifetime) = refresher(self.credentials.clone()).await?;
        self.lock_state().set_token(token, lifetime);
        Ok(true)
    }
}
