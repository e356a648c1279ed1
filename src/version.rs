//! Version strings: the idempotence marker for payloads.
//!
//! A version is a short stable string identifying the content of a payload.
//! Three derivations are supported, matching the checkpoint kinds a source
//! is likely to already have at hand:
//!
//! - an update timestamp, normalized to UTC ISO-8601
//! - a monotonic id, in decimal
//! - a content hash: canonical JSON (UTF-8, sorted keys, no insignificant
//!   whitespace) digested with SHA-256, for sources without an update marker
//!
//! Canonical JSON guarantees the same logical payload hashes identically
//! across runs and implementations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::checkpoint::{datetime_from_epoch_seconds, parse_datetime_token};
use crate::errors::{Result, SyncError};

/// Version string from an update timestamp.
#[must_use]
pub fn from_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Version string from a textual timestamp (ISO-8601, unix seconds, or one
/// of the tolerated fallback formats; naive values are treated as UTC).
///
/// # Errors
///
/// Permanent mapping error when the text is not a recognizable timestamp.
pub fn from_timestamp_str(value: &str) -> Result<String> {
    parse_datetime_token(value)
        .map(|dt| dt.to_rfc3339())
        .map_err(|reason| {
            SyncError::permanent_mapping(format!("invalid version timestamp '{value}': {reason}"))
        })
}

/// Version string from unix epoch seconds.
///
/// # Errors
///
/// Permanent mapping error for non-finite or out-of-range values.
pub fn from_epoch_seconds(seconds: f64) -> Result<String> {
    datetime_from_epoch_seconds(seconds)
        .map(|dt| dt.to_rfc3339())
        .map_err(|reason| {
            SyncError::permanent_mapping(format!("invalid version timestamp {seconds}: {reason}"))
        })
}

/// Version string from a monotonic id.
///
/// # Errors
///
/// Permanent mapping error for negative ids.
pub fn from_monotonic(id: i64) -> Result<String> {
    if id < 0 {
        return Err(SyncError::permanent_mapping(
            "monotonic id must be non-negative",
        ));
    }
    Ok(id.to_string())
}

/// Version string from the payload content itself: SHA-256 hex over the
/// canonical JSON form.
///
/// # Errors
///
/// Permanent mapping error when the payload cannot be serialized.
pub fn from_content<T: Serialize>(data: &T) -> Result<String> {
    let dump = canonical_json(data)?;
    let digest = Sha256::digest(dump.as_bytes());
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

/// Canonical JSON serialization: UTF-8, object keys sorted, no
/// insignificant whitespace.
///
/// `serde_json` keeps object keys in a sorted map and emits compact output
/// by default, which is exactly the canonical form; this helper exists so
/// hashing call sites don't silently pick up a non-canonical serializer.
///
/// # Errors
///
/// Permanent mapping error when `data` cannot be represented as JSON (e.g.
/// non-finite floats).
pub fn canonical_json<T: Serialize>(data: &T) -> Result<String> {
    let value = serde_json::to_value(data)
        .map_err(|err| SyncError::permanent_mapping(format!("cannot hash payload: {err}")))?;
    serde_json::to_string(&value)
        .map_err(|err| SyncError::permanent_mapping(format!("cannot hash payload: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_keys_at_every_level() {
        let value = serde_json::json!({
            "b": 1,
            "a": {"z": true, "a": [1, {"y": 2, "x": 3}]},
        });
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"a":[1,{"x":3,"y":2}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn content_version_is_stable_under_key_order() {
        let left = serde_json::json!({"id": 1, "name": "x"});
        let right = serde_json::json!({"name": "x", "id": 1});
        assert_eq!(from_content(&left).unwrap(), from_content(&right).unwrap());
    }
}
