//! The write seam: projections are upserted into the internal system here.

use async_trait::async_trait;

use crate::errors::{Result, SyncError};
use crate::types::{Binding, ExternalKey, Projection};

/// Receiver that upserts projections into the internal system.
///
/// # Idempotence contract
///
/// `upsert` must be idempotent when the source re-delivers the same
/// `(key, version)`: together with the driver's same-version short-circuit
/// this is what makes at-least-once delivery safe.
#[async_trait]
pub trait Target: Send + Sync {
    /// Target payload accepted by this receiver.
    type Item: Send + Sync;

    /// Pre-write validation of a projection.
    ///
    /// # Errors
    ///
    /// Target errors for projections the internal system would reject.
    fn validate(&self, _key: &ExternalKey, _projection: &Projection<Self::Item>) -> Result<()> {
        Ok(())
    }

    /// Create or update the entity for `key` and return its internal id.
    ///
    /// `binding` is the stored binding for the key, if any; its presence
    /// distinguishes update from create and its `internal_id` addresses the
    /// existing record.
    ///
    /// # Errors
    ///
    /// Temporary target errors for transport failures, permanent target
    /// errors for validation/4xx rejections.
    async fn upsert(
        &self,
        key: &ExternalKey,
        projection: &Projection<Self::Item>,
        binding: Option<&Binding>,
    ) -> Result<String>;

    /// Delete or archive the bound entity.
    ///
    /// Used by full-snapshot reconciliation; the sync driver itself never
    /// calls it. The default implementation reports the operation as
    /// unsupported.
    ///
    /// # Errors
    ///
    /// Permanent target error unless overridden.
    async fn delete(&self, key: &ExternalKey, _binding: &Binding) -> Result<()> {
        Err(SyncError::permanent_target(format!(
            "delete not supported for {key}"
        )))
    }
}
