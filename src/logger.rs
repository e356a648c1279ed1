//! Per-item lifecycle reporting.
//!
//! The driver reports what happened to every item through a [`SyncLogger`].
//! Hooks are infallible on purpose: reporting must never be able to fail a
//! sync run, so implementations swallow their own errors.

use crate::errors::SyncError;
use crate::types::ExternalKey;

/// Why an item was skipped without touching the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The stored binding already carries the payload's version.
    SameVersion,
    /// The item is in a permanent-error state for this version.
    PermError,
    /// The item exhausted its retry budget for this version.
    MaxAttempts,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameVersion => "same_version",
            Self::PermError => "perm_error",
            Self::MaxAttempts => "max_attempts",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer of per-item sync lifecycle events.
///
/// All hooks default to no-ops, so implementations subscribe only to the
/// events they care about.
pub trait SyncLogger: Send + Sync {
    fn on_skipped(&self, _key: &ExternalKey, _reason: SkipReason) {}

    fn on_created(&self, _key: &ExternalKey, _internal_id: &str) {}

    fn on_updated(&self, _key: &ExternalKey, _internal_id: &str) {}

    fn on_deleted(&self, _key: &ExternalKey, _internal_id: &str) {}

    fn on_error(&self, _key: &ExternalKey, _error: &SyncError) {}
}

impl<T> SyncLogger for std::sync::Arc<T>
where
    T: SyncLogger + ?Sized,
{
    fn on_skipped(&self, key: &ExternalKey, reason: SkipReason) {
        (**self).on_skipped(key, reason);
    }

    fn on_created(&self, key: &ExternalKey, internal_id: &str) {
        (**self).on_created(key, internal_id);
    }

    fn on_updated(&self, key: &ExternalKey, internal_id: &str) {
        (**self).on_updated(key, internal_id);
    }

    fn on_deleted(&self, key: &ExternalKey, internal_id: &str) {
        (**self).on_deleted(key, internal_id);
    }

    fn on_error(&self, key: &ExternalKey, error: &SyncError) {
        (**self).on_error(key, error);
    }
}

/// Logger that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSyncLogger;

impl SyncLogger for NoopSyncLogger {}

/// Logger that forwards events to `tracing`.
///
/// Skips and writes land at `debug`/`info`, failures at `warn`; run-fatal
/// errors surface separately through the driver's returned error.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSyncLogger;

impl TracingSyncLogger {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SyncLogger for TracingSyncLogger {
    fn on_skipped(&self, key: &ExternalKey, reason: SkipReason) {
        tracing::debug!(key = %key, reason = %reason, "item skipped");
    }

    fn on_created(&self, key: &ExternalKey, internal_id: &str) {
        tracing::info!(key = %key, internal_id, "item created");
    }

    fn on_updated(&self, key: &ExternalKey, internal_id: &str) {
        tracing::info!(key = %key, internal_id, "item updated");
    }

    fn on_deleted(&self, key: &ExternalKey, internal_id: &str) {
        tracing::info!(key = %key, internal_id, "item deleted");
    }

    fn on_error(&self, key: &ExternalKey, error: &SyncError) {
        tracing::warn!(key = %key, error = %error, "item failed");
    }
}
