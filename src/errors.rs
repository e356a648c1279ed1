//! Error taxonomy for the synchronization engine.
//!
//! Failures are classified along two orthogonal axes:
//!
//! - **Origin**: which stage of the pipeline failed: the [`Source`](crate::source::Source),
//!   the [`Mapper`](crate::mapper::Mapper), the [`Target`](crate::target::Target),
//!   or the [`StateStore`](crate::store::StateStore).
//! - **Retryability**: whether retrying the same input can possibly succeed.
//!   *Temporary* failures (network, 5xx, timeouts, a transiently unavailable
//!   reference dictionary) are retried up to the driver's attempt budget and
//!   pin the stream checkpoint while retries remain. *Permanent* failures
//!   (malformed data, business-rule violations, 4xx responses) are recorded
//!   once and skipped until the item's version changes.
//!
//! The driver classifies purely by the retryability axis; origin exists for
//! diagnostics and for implementors picking the right constructor.

use miette::Diagnostic;
use thiserror::Error;

/// The pipeline stage a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorOrigin {
    /// Fetching or technically validating external data.
    Source,
    /// Business validation or projection of a payload.
    Mapping,
    /// Validating or writing into the internal system.
    Target,
    /// Checkpoint / binding / item-state storage.
    State,
}

impl std::fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Mapping => write!(f, "mapping"),
            Self::Target => write!(f, "target"),
            Self::State => write!(f, "state"),
        }
    }
}

/// Synchronization failure, classified by origin and retryability.
///
/// Construct variants through the shorthand constructors
/// ([`SyncError::temporary_source`] and friends) rather than spelling out
/// the struct variants at call sites.
#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    /// Transient source failure (network, 5xx, timeout).
    #[error("temporary source error: {message}")]
    #[diagnostic(
        code(syncline::source::temporary),
        help("Transient source failures are retried on the next run; the checkpoint is not advanced past the item.")
    )]
    TemporarySource { message: String },

    /// Unrecoverable source failure (malformed data, missing required checkpoint).
    #[error("permanent source error: {message}")]
    #[diagnostic(
        code(syncline::source::permanent),
        help("Repair the source data or the stored checkpoint; retries with the same input cannot succeed.")
    )]
    PermanentSource { message: String },

    /// Transient mapping failure (e.g. a reference dictionary is briefly unavailable).
    #[error("temporary mapping error: {message}")]
    #[diagnostic(code(syncline::mapping::temporary))]
    TemporaryMapping { message: String },

    /// Business-rule violation in the payload.
    #[error("permanent mapping error: {message}")]
    #[diagnostic(
        code(syncline::mapping::permanent),
        help("The payload violates a business rule; the item stays skipped until its version changes.")
    )]
    PermanentMapping { message: String },

    /// Transient target failure (network, 5xx).
    #[error("temporary target error: {message}")]
    #[diagnostic(code(syncline::target::temporary))]
    TemporaryTarget { message: String },

    /// Unrecoverable target failure (validation, 4xx).
    #[error("permanent target error: {message}")]
    #[diagnostic(code(syncline::target::permanent))]
    PermanentTarget { message: String },

    /// Transient state-store failure (connectivity, lock contention).
    #[error("temporary state error: {message}")]
    #[diagnostic(code(syncline::state::temporary))]
    TemporaryState { message: String },

    /// Unrecoverable state-store failure (corrupt row, invalid binding).
    #[error("permanent state error: {message}")]
    #[diagnostic(
        code(syncline::state::permanent),
        help("The persisted sync state is structurally invalid and must be repaired by hand.")
    )]
    PermanentState { message: String },

    /// Failure that carries no retryability classification.
    ///
    /// The driver records these as permanent.
    #[error("sync error: {message}")]
    #[diagnostic(code(syncline::uncategorized))]
    Uncategorized { message: String },
}

impl SyncError {
    pub fn temporary_source(message: impl Into<String>) -> Self {
        Self::TemporarySource {
            message: message.into(),
        }
    }

    pub fn permanent_source(message: impl Into<String>) -> Self {
        Self::PermanentSource {
            message: message.into(),
        }
    }

    pub fn temporary_mapping(message: impl Into<String>) -> Self {
        Self::TemporaryMapping {
            message: message.into(),
        }
    }

    pub fn permanent_mapping(message: impl Into<String>) -> Self {
        Self::PermanentMapping {
            message: message.into(),
        }
    }

    pub fn temporary_target(message: impl Into<String>) -> Self {
        Self::TemporaryTarget {
            message: message.into(),
        }
    }

    pub fn permanent_target(message: impl Into<String>) -> Self {
        Self::PermanentTarget {
            message: message.into(),
        }
    }

    pub fn temporary_state(message: impl Into<String>) -> Self {
        Self::TemporaryState {
            message: message.into(),
        }
    }

    pub fn permanent_state(message: impl Into<String>) -> Self {
        Self::PermanentState {
            message: message.into(),
        }
    }

    pub fn uncategorized(message: impl Into<String>) -> Self {
        Self::Uncategorized {
            message: message.into(),
        }
    }

    /// The stage this error originated from, if it carries one.
    #[must_use]
    pub fn origin(&self) -> Option<ErrorOrigin> {
        match self {
            Self::TemporarySource { .. } | Self::PermanentSource { .. } => Some(ErrorOrigin::Source),
            Self::TemporaryMapping { .. } | Self::PermanentMapping { .. } => {
                Some(ErrorOrigin::Mapping)
            }
            Self::TemporaryTarget { .. } | Self::PermanentTarget { .. } => Some(ErrorOrigin::Target),
            Self::TemporaryState { .. } | Self::PermanentState { .. } => Some(ErrorOrigin::State),
            Self::Uncategorized { .. } => None,
        }
    }

    /// Whether retrying the same input can possibly succeed.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            Self::TemporarySource { .. }
                | Self::TemporaryMapping { .. }
                | Self::TemporaryTarget { .. }
                | Self::TemporaryState { .. }
        )
    }

    /// Whether the failure is known to be unrecoverable for this input.
    ///
    /// Note that [`SyncError::Uncategorized`] is neither temporary nor
    /// permanent; the driver treats it as permanent when recording item
    /// state.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::PermanentSource { .. }
                | Self::PermanentMapping { .. }
                | Self::PermanentTarget { .. }
                | Self::PermanentState { .. }
        )
    }

    /// The message carried by the error, without the classification prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::TemporarySource { message }
            | Self::PermanentSource { message }
            | Self::TemporaryMapping { message }
            | Self::PermanentMapping { message }
            | Self::TemporaryTarget { message }
            | Self::PermanentTarget { message }
            | Self::TemporaryState { message }
            | Self::PermanentState { message }
            | Self::Uncategorized { message } => message,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
