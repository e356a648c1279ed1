//! Checkpoint tokens: parsing, formatting, and the deferred tail value.
//!
//! A checkpoint is the per-stream resume token persisted between runs. Its
//! wire format depends on the source's [`CheckpointKind`]:
//!
//! - [`CheckpointKind::UpdatedAt`]: RFC3339/ISO-8601 UTC timestamp
//! - [`CheckpointKind::MonotonicId`]: non-negative integer in decimal
//! - [`CheckpointKind::Cursor`]: opaque non-empty string issued by the
//!   foreign API
//! - [`CheckpointKind::None`]: no token at all (full-snapshot sources)
//!
//! [`CheckpointCodec`] converts between stored token strings and typed
//! [`CheckpointValue`]s, with optional injected parse/format hooks for
//! sources whose token shape deviates from the defaults. Invalid tokens are
//! permanent source errors: the stream cannot progress until the source or
//! the stored state is repaired.
//!
//! [`CheckpointCell`] and [`NextCheckpoint`] carry the *next* checkpoint out
//! of a fetch. Sources that only know their final checkpoint after the last
//! page has been consumed (e.g. tracking the maximum `updated_at` seen)
//! hand the driver a deferred cell instead of a resolved token; the driver
//! peeks it for batched mid-run saves and resolves it after the item stream
//! is exhausted.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::errors::{Result, SyncError};

/// Fallback patterns tried after ISO-8601 and unix-seconds parsing fail.
const FALLBACK_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Fallback patterns that carry an explicit UTC offset.
const FALLBACK_DATETIME_FORMATS_TZ: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// The wire shape of a source's checkpoint tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CheckpointKind {
    /// Timestamp of the most recent change seen (RFC3339/ISO-8601, UTC).
    UpdatedAt,
    /// Monotonically increasing non-negative integer id.
    MonotonicId,
    /// Opaque cursor / next-page token issued by the foreign API.
    Cursor,
    /// No checkpoint; used only by full-snapshot sources.
    None,
}

impl CheckpointKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdatedAt => "updated_at",
            Self::MonotonicId => "monotonic_id",
            Self::Cursor => "cursor",
            Self::None => "none",
        }
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A checkpoint token parsed into its domain value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointValue {
    Timestamp(DateTime<Utc>),
    MonotonicId(i64),
    Cursor(String),
}

impl CheckpointValue {
    pub fn timestamp(at: DateTime<Utc>) -> Self {
        Self::Timestamp(at)
    }

    pub fn monotonic(id: i64) -> Self {
        Self::MonotonicId(id)
    }

    pub fn cursor(token: impl Into<String>) -> Self {
        Self::Cursor(token.into())
    }
}

/// Injected override for token parsing.
pub type CheckpointParser = dyn Fn(&str) -> Result<CheckpointValue> + Send + Sync;
/// Injected override for token formatting.
pub type CheckpointFormatter = dyn Fn(&CheckpointValue) -> Result<String> + Send + Sync;

/// Parses and formats checkpoint tokens for one [`CheckpointKind`].
///
/// Sources embed a codec and run every incoming `since` token and every
/// outgoing next-checkpoint value through it. By default a codec for any
/// kind except [`CheckpointKind::None`] *requires* a prior checkpoint, so an
/// incremental source cannot accidentally full-scan on its first run; relax
/// that with [`CheckpointCodec::required`].
pub struct CheckpointCodec {
    kind: CheckpointKind,
    required: bool,
    parser: Option<Box<CheckpointParser>>,
    formatter: Option<Box<CheckpointFormatter>>,
}

impl fmt::Debug for CheckpointCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointCodec")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .finish()
    }
}

impl CheckpointCodec {
    #[must_use]
    pub fn new(kind: CheckpointKind) -> Self {
        Self {
            kind,
            required: kind != CheckpointKind::None,
            parser: None,
            formatter: None,
        }
    }

    /// Whether fetching without a prior checkpoint is legal.
    ///
    /// Ignored for [`CheckpointKind::None`], which never requires one.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required && self.kind != CheckpointKind::None;
        self
    }

    /// Replace the default token parser.
    #[must_use]
    pub fn with_parser(
        mut self,
        parser: impl Fn(&str) -> Result<CheckpointValue> + Send + Sync + 'static,
    ) -> Self {
        self.parser = Some(Box::new(parser));
        self
    }

    /// Replace the default token formatter.
    #[must_use]
    pub fn with_formatter(
        mut self,
        formatter: impl Fn(&CheckpointValue) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    #[must_use]
    pub fn kind(&self) -> CheckpointKind {
        self.kind
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Guard a fetch against running without a required prior checkpoint.
    ///
    /// # Errors
    ///
    /// Permanent source error when the codec requires a checkpoint and
    /// `since` is absent.
    pub fn ensure_checkpoint(&self, since: Option<&str>) -> Result<()> {
        if self.required && since.is_none() {
            return Err(SyncError::permanent_source("checkpoint required"));
        }
        Ok(())
    }

    /// Validate and parse an incoming `since` token.
    ///
    /// Combines [`ensure_checkpoint`](Self::ensure_checkpoint) with
    /// [`parse`](Self::parse); `None` in, `None` out.
    pub fn parse_since(&self, since: Option<&str>) -> Result<Option<CheckpointValue>> {
        self.ensure_checkpoint(since)?;
        match since {
            Some(token) => self.parse(token),
            None => Ok(None),
        }
    }

    /// Parse one stored token into its domain value.
    ///
    /// Returns `Ok(None)` only for [`CheckpointKind::None`].
    ///
    /// # Errors
    ///
    /// Permanent source error for tokens that do not match the kind's wire
    /// format.
    pub fn parse(&self, token: &str) -> Result<Option<CheckpointValue>> {
        if self.kind == CheckpointKind::None {
            return Ok(None);
        }
        if let Some(parser) = &self.parser {
            return parser(token).map(Some);
        }
        let parsed = match self.kind {
            CheckpointKind::UpdatedAt => {
                parse_datetime_token(token).map(CheckpointValue::Timestamp)
            }
            CheckpointKind::MonotonicId => {
                parse_monotonic_token(token).map(CheckpointValue::MonotonicId)
            }
            CheckpointKind::Cursor => parse_cursor_token(token).map(CheckpointValue::Cursor),
            CheckpointKind::None => unreachable!("handled above"),
        };
        parsed
            .map(Some)
            .map_err(|reason| {
                SyncError::permanent_source(format!("invalid checkpoint '{token}': {reason}"))
            })
    }

    /// Format a next-checkpoint value for persistence.
    ///
    /// `None` means the source saw no new data; the stored token is left in
    /// place (`Ok(None)`). Values are coerced where the original shape
    /// allows it: an `UpdatedAt` codec accepts a monotonic value as epoch
    /// seconds or a cursor holding a datetime string, a `MonotonicId` codec
    /// accepts a numeric cursor, and a `Cursor` codec accepts anything with
    /// a non-empty string form.
    ///
    /// # Errors
    ///
    /// Permanent source error when the value cannot be expressed in the
    /// kind's wire format, or when a [`CheckpointKind::None`] codec is
    /// handed any value at all.
    pub fn format(&self, value: Option<&CheckpointValue>) -> Result<Option<String>> {
        let Some(value) = value else {
            return Ok(None);
        };
        if self.kind == CheckpointKind::None {
            return Err(SyncError::permanent_source(
                "checkpoint kind 'none' must not produce a checkpoint",
            ));
        }
        if let Some(formatter) = &self.formatter {
            return formatter(value).map(Some);
        }
        let formatted = match self.kind {
            CheckpointKind::UpdatedAt => coerce_timestamp(value).map(|dt| dt.to_rfc3339()),
            CheckpointKind::MonotonicId => coerce_monotonic(value).map(|id| id.to_string()),
            CheckpointKind::Cursor => coerce_cursor(value),
            CheckpointKind::None => unreachable!("handled above"),
        };
        formatted.map(Some).map_err(|reason| {
            SyncError::permanent_source(format!("invalid checkpoint value {value:?}: {reason}"))
        })
    }
}

/// Parse a stored timestamp token.
///
/// Tries RFC3339/ISO-8601 (trailing `Z` accepted), then naive ISO, then
/// decimal unix seconds, then the fallback pattern table. Naive timestamps
/// are treated as UTC.
pub(crate) fn parse_datetime_token(token: &str) -> std::result::Result<DateTime<Utc>, String> {
    let cleaned = token.trim();
    let cleaned = match cleaned.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => cleaned.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = cleaned.parse::<NaiveDateTime>() {
        return Ok(naive.and_utc());
    }
    if let Ok(seconds) = cleaned.parse::<f64>() {
        return datetime_from_epoch_seconds(seconds);
    }
    for format in FALLBACK_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&cleaned, format) {
            return Ok(naive.and_utc());
        }
    }
    for format in FALLBACK_DATETIME_FORMATS_TZ {
        if let Ok(dt) = DateTime::parse_from_str(&cleaned, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    Err("cannot parse datetime".to_string())
}

pub(crate) fn datetime_from_epoch_seconds(
    seconds: f64,
) -> std::result::Result<DateTime<Utc>, String> {
    if !seconds.is_finite() {
        return Err("timestamp is not finite".to_string());
    }
    let nanos_total = (seconds * 1e9).round() as i128;
    let secs = nanos_total.div_euclid(1_000_000_000);
    let nanos = nanos_total.rem_euclid(1_000_000_000) as u32;
    let secs = i64::try_from(secs).map_err(|_| "timestamp out of range".to_string())?;
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| "timestamp out of range".to_string())
}

fn parse_monotonic_token(token: &str) -> std::result::Result<i64, String> {
    let value: i64 = token
        .trim()
        .parse()
        .map_err(|_| "not an integer".to_string())?;
    if value < 0 {
        return Err("monotonic id must be non-negative".to_string());
    }
    Ok(value)
}

fn parse_cursor_token(token: &str) -> std::result::Result<String, String> {
    let cleaned = token.trim();
    if cleaned.is_empty() {
        return Err("cursor cannot be empty".to_string());
    }
    Ok(cleaned.to_string())
}

fn coerce_timestamp(value: &CheckpointValue) -> std::result::Result<DateTime<Utc>, String> {
    match value {
        CheckpointValue::Timestamp(dt) => Ok(*dt),
        CheckpointValue::MonotonicId(id) => datetime_from_epoch_seconds(*id as f64),
        CheckpointValue::Cursor(token) => parse_datetime_token(token),
    }
}

fn coerce_monotonic(value: &CheckpointValue) -> std::result::Result<i64, String> {
    let id = match value {
        CheckpointValue::MonotonicId(id) => *id,
        CheckpointValue::Cursor(token) => token
            .trim()
            .parse()
            .map_err(|_| "not an integer".to_string())?,
        CheckpointValue::Timestamp(_) => return Err("expected monotonic id".to_string()),
    };
    if id < 0 {
        return Err("monotonic id must be non-negative".to_string());
    }
    Ok(id)
}

fn coerce_cursor(value: &CheckpointValue) -> std::result::Result<String, String> {
    let token = match value {
        CheckpointValue::Cursor(token) => token.clone(),
        CheckpointValue::MonotonicId(id) => id.to_string(),
        CheckpointValue::Timestamp(dt) => dt.to_rfc3339(),
    };
    parse_cursor_token(&token)
}

/// Shared slot for the last next-checkpoint a paging source has observed.
///
/// A lazy source clones the cell into its item stream and writes the latest
/// page token as pages are consumed; the driver reads it through
/// [`NextCheckpoint::Deferred`].
#[derive(Clone, Debug, Default)]
pub struct CheckpointCell {
    inner: Arc<Mutex<Option<String>>>,
}

impl CheckpointCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = token;
    }

    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The next checkpoint produced by a fetch: already resolved, or deferred
/// behind a [`CheckpointCell`] that fills in as the item stream is consumed.
#[derive(Clone, Debug)]
pub enum NextCheckpoint {
    Resolved(Option<String>),
    Deferred(CheckpointCell),
}

impl NextCheckpoint {
    pub fn resolved(token: impl Into<String>) -> Self {
        Self::Resolved(Some(token.into()))
    }

    /// A fetch that advances no checkpoint.
    #[must_use]
    pub fn none() -> Self {
        Self::Resolved(None)
    }

    #[must_use]
    pub fn deferred(cell: CheckpointCell) -> Self {
        Self::Deferred(cell)
    }

    /// The checkpoint as currently known; safe to call mid-stream.
    #[must_use]
    pub fn peek(&self) -> Option<String> {
        match self {
            Self::Resolved(token) => token.clone(),
            Self::Deferred(cell) => cell.get(),
        }
    }

    /// The final checkpoint. Only meaningful once the item stream that
    /// feeds a deferred cell has been exhausted.
    #[must_use]
    pub fn resolve(self) -> Option<String> {
        match self {
            Self::Resolved(token) => token,
            Self::Deferred(cell) => cell.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_is_shared_between_clones() {
        let cell = CheckpointCell::new();
        let writer = cell.clone();
        let deferred = NextCheckpoint::deferred(cell);
        assert_eq!(deferred.peek(), None);
        writer.set(Some("cp-7".into()));
        assert_eq!(deferred.peek(), Some("cp-7".into()));
        assert_eq!(deferred.resolve(), Some("cp-7".into()));
    }
}
