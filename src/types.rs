//! Core data model for the synchronization engine.
//!
//! These are the shapes that flow between the extension seams: an item is
//! identified by an [`ExternalKey`], arrives as a [`Payload`], is projected
//! into a [`Projection`], and leaves behind a durable [`Binding`] plus a
//! per-item [`SyncItemState`]. One run's counters accumulate in a
//! [`SyncResult`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of an item in the foreign system.
///
/// Equality is structural on both fields; `(system, key)` is the unique key
/// for bindings and item states.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalKey {
    /// Short tag naming the foreign system instance (e.g. `"tickets_api"`).
    pub system: String,
    /// Opaque stable id within that system.
    pub key: String,
}

impl ExternalKey {
    pub fn new(system: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            key: key.into(),
        }
    }

    /// Synthetic key used to log failures that happen before any item is in
    /// hand (the initial fetch), scoped to a stream rather than a system.
    #[must_use]
    pub fn fetch_sentinel(stream: &str) -> Self {
        Self::new(stream, "__fetch__")
    }
}

impl fmt::Display for ExternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system, self.key)
    }
}

/// Normalized envelope from the Source.
///
/// `version` is the sole basis for idempotence: two payloads with equal
/// version for the same key are defined to project to the same target
/// record. See [`crate::version`] for the version constructors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload<T> {
    pub data: T,
    /// Short version string: ISO timestamp, monotonic integer, or content hash.
    pub version: Option<String>,
}

impl<T> Payload<T> {
    pub fn new(data: T, version: Option<String>) -> Self {
        Self { data, version }
    }

    /// Payload whose version is derived from an update timestamp.
    pub fn with_timestamp_version(data: T, updated_at: DateTime<Utc>) -> Self {
        Self {
            data,
            version: Some(crate::version::from_datetime(updated_at)),
        }
    }

    /// Payload whose version is derived from a monotonic id.
    ///
    /// # Errors
    ///
    /// Returns a permanent mapping error for negative ids.
    pub fn with_monotonic_version(data: T, id: i64) -> crate::errors::Result<Self> {
        let version = crate::version::from_monotonic(id)?;
        Ok(Self {
            data,
            version: Some(version),
        })
    }

    /// Payload whose version is a SHA-256 over the canonical JSON form of
    /// `data`, for sources that expose no update marker.
    ///
    /// # Errors
    ///
    /// Returns a permanent mapping error if `data` cannot be serialized.
    pub fn with_content_version(data: T) -> crate::errors::Result<Self>
    where
        T: Serialize,
    {
        let version = crate::version::from_content(&data)?;
        Ok(Self {
            data,
            version: Some(version),
        })
    }
}

/// Target-shaped record produced by the Mapper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection<T> {
    /// Discriminator for the target entity type (e.g. `"activity"`).
    pub kind: String,
    pub data: T,
}

impl<T> Projection<T> {
    pub fn new(kind: impl Into<String>, data: T) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Durable record that an [`ExternalKey`] has been materialized into the
/// target as `internal_id` at some version.
///
/// `version` is the version last *successfully* written to the target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub internal_id: String,
    pub version: Option<String>,
}

impl Binding {
    pub fn new(internal_id: impl Into<String>, version: Option<String>) -> Self {
        Self {
            internal_id: internal_id.into(),
            version,
        }
    }

    /// Whether the version of the external data has already been synchronized.
    ///
    /// A binding with no recorded version never matches: content without a
    /// version must always be re-projected.
    #[must_use]
    pub fn is_up_to_date_for<T>(&self, payload: &Payload<T>) -> bool {
        self.version.is_some() && self.version == payload.version
    }
}

/// A binding together with the key it belongs to, as yielded by
/// [`StateStore::iter_bindings`](crate::store::StateStore::iter_bindings).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBinding {
    pub key: ExternalKey,
    pub binding: Binding,
}

/// Processing status of one `(key, version)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncItemStatus {
    /// Not yet attempted.
    Pending,
    /// Synchronized successfully.
    Success,
    /// Failed with a retryable error; eligible for retry while attempts remain.
    TempError,
    /// Failed permanently; skipped until the item's version changes.
    PermError,
}

impl SyncItemStatus {
    /// Persisted string form, as stored in the state store.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::TempError => "temp_error",
            Self::PermError => "perm_error",
        }
    }

    /// Decode the persisted string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "temp_error" => Some(Self::TempError),
            "perm_error" => Some(Self::PermError),
            _ => None,
        }
    }
}

impl fmt::Display for SyncItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-key processing state, separate from [`Binding`].
///
/// `version` records the version of the last attempt; a new payload with a
/// different version resets the state machine for the key. `attempts`
/// counts attempts over the lifetime of the row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncItemState {
    pub key: ExternalKey,
    pub version: Option<String>,
    pub status: SyncItemStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl SyncItemState {
    pub fn new(
        key: ExternalKey,
        version: Option<String>,
        status: SyncItemStatus,
        attempts: u32,
        last_error: Option<String>,
    ) -> Self {
        Self {
            key,
            version,
            status,
            attempts,
            last_error,
        }
    }
}

/// Counters for one synchronization run.
///
/// Immutable: the `inc_*` operations return a new value with the counter
/// incremented, carrying `started_at` through unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncResult {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Captured when the driver constructs the result at the start of a run.
    pub started_at: DateTime<Utc>,
}

impl SyncResult {
    #[must_use]
    pub fn new() -> Self {
        Self {
            created: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn inc_created(self) -> Self {
        Self {
            created: self.created + 1,
            ..self
        }
    }

    #[must_use]
    pub fn inc_updated(self) -> Self {
        Self {
            updated: self.updated + 1,
            ..self
        }
    }

    #[must_use]
    pub fn inc_skipped(self) -> Self {
        Self {
            skipped: self.skipped + 1,
            ..self
        }
    }

    #[must_use]
    pub fn inc_failed(self) -> Self {
        Self {
            failed: self.failed + 1,
            ..self
        }
    }

    /// Total number of items the run accounted for.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.created + self.updated + self.skipped + self.failed
    }
}

impl Default for SyncResult {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_persisted_form() {
        for status in [
            SyncItemStatus::Pending,
            SyncItemStatus::Success,
            SyncItemStatus::TempError,
            SyncItemStatus::PermError,
        ] {
            assert_eq!(SyncItemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SyncItemStatus::parse("bogus"), None);
    }

    #[test]
    fn binding_version_match() {
        let binding = Binding::new("42", Some("v1".into()));
        assert!(binding.is_up_to_date_for(&Payload::new((), Some("v1".into()))));
        assert!(!binding.is_up_to_date_for(&Payload::new((), Some("v2".into()))));
        assert!(!binding.is_up_to_date_for(&Payload::new((), None)));

        let unversioned = Binding::new("42", None);
        assert!(!unversioned.is_up_to_date_for(&Payload::<()>::new((), None)));
    }

    #[test]
    fn result_counters_are_immutable_updates() {
        let result = SyncResult::new();
        let started = result.started_at;
        let result = result.inc_created().inc_skipped().inc_skipped();
        assert_eq!(result.created, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.total(), 3);
        assert_eq!(result.started_at, started);
    }
}
