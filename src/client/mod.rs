//! Generic retrying HTTP client for Source/Target implementations.
//!
//! Concrete sources and targets that talk to HTTP APIs share one client
//! shape: a base URL with timeouts, default headers, and a per-client log
//! level ([`ApiConfig`]), static or refreshable authorization fed by
//! [`Credentials`] ([`AuthStrategy`]), a bounded retry policy for transport
//! errors and retryable statuses ([`RetryPolicy`]), and an optional
//! fixed-window request budget ([`RateLimitWindow`]).
//!
//! The client is a collaborator of the sync engine, not part of it: the
//! driver never sees HTTP. Implementations convert an [`ApiError`] at the
//! seam with [`ApiError::into_source_error`] / [`ApiError::into_target_error`]
//! so failures land in the right spot of the sync taxonomy.

mod api;
mod auth;
mod config;
mod error;
mod retry;

pub use api::ApiClient;
pub use auth::{ApiKeyHeaderAuth, AuthStrategy, BearerTokenAuth, NoAuth, TokenRefresher};
pub use config::{ApiConfig, AuthState, Credentials, RateLimitWindow};
pub use error::ApiError;
pub use retry::{BackoffStrategy, RetryPolicy};
