//! Persistent synchronization state: checkpoints, bindings, item states.
//!
//! The [`StateStore`] trait is the engine's only shared mutable surface.
//! One row family per concern:
//!
//! - **checkpoints**: one resume token per stream
//! - **bindings**: `ExternalKey` ↔ `internal_id` plus the last version
//!   successfully written to the target
//! - **item states**: per-key processing status, attempt counter, and last
//!   error
//!
//! The driver assumes a single writer per stream, but the store itself must
//! stay consistent when `save_checkpoint` and `bind` race across streams:
//! every write is an atomic per-row upsert keyed by `stream` or
//! `(system, ext_key)`.
//!
//! # Backends
//!
//! - [`InMemoryStateStore`]: volatile storage for tests and development
//! - [`SqliteStateStore`]: durable SQLite-backed persistence (feature
//!   `sqlite`)

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStateStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStateStore;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::errors::{Result, SyncError};
use crate::types::{Binding, ExternalKey, KeyBinding, SyncItemState};

/// Lazy sequence of bindings for one system, used by full-snapshot
/// reconciliation to detect deletions.
pub type BindingStream<'a> = BoxStream<'a, Result<KeyBinding>>;

/// Storage contract for checkpoints, bindings, and per-item sync states.
///
/// Implementations must be safe under concurrent writers at the per-row
/// level; all operations are upserts against a unique key.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Last persisted checkpoint token for the stream, if any.
    async fn get_checkpoint(&self, stream: &str) -> Result<Option<String>>;

    /// Upsert the checkpoint token for a stream. Atomic per stream.
    async fn save_checkpoint(&self, stream: &str, token: &str) -> Result<()>;

    /// Upsert the binding for a key. Atomic per key.
    async fn bind(&self, key: &ExternalKey, internal_id: &str, version: Option<&str>)
        -> Result<()>;

    async fn get_binding(&self, key: &ExternalKey) -> Result<Option<Binding>>;

    /// Lazily iterate every binding recorded for a system.
    async fn iter_bindings<'a>(&'a self, system: &'a str) -> Result<BindingStream<'a>>;

    /// Structural consistency check for a stored binding.
    ///
    /// # Errors
    ///
    /// Permanent state error for bindings the target could never have
    /// produced (e.g. an empty `internal_id`).
    fn validate_binding(&self, key: &ExternalKey, binding: &Binding) -> Result<()> {
        if binding.internal_id.trim().is_empty() {
            return Err(SyncError::permanent_state(format!(
                "empty internal_id for {key}"
            )));
        }
        Ok(())
    }

    async fn get_item_state(&self, key: &ExternalKey) -> Result<Option<SyncItemState>>;

    /// Upsert the processing state for a key. Atomic per key.
    async fn save_item_state(&self, state: &SyncItemState) -> Result<()>;
}

// A store is commonly shared between jobs for different streams; forwarding
// through Arc lets one instance be handed to each of them by value.
#[async_trait]
impl<T> StateStore for std::sync::Arc<T>
where
    T: StateStore + ?Sized,
{
    async fn get_checkpoint(&self, stream: &str) -> Result<Option<String>> {
        (**self).get_checkpoint(stream).await
    }

    async fn save_checkpoint(&self, stream: &str, token: &str) -> Result<()> {
        (**self).save_checkpoint(stream, token).await
    }

    async fn bind(
        &self,
        key: &ExternalKey,
        internal_id: &str,
        version: Option<&str>,
    ) -> Result<()> {
        (**self).bind(key, internal_id, version).await
    }

    async fn get_binding(&self, key: &ExternalKey) -> Result<Option<Binding>> {
        (**self).get_binding(key).await
    }

    async fn iter_bindings<'a>(&'a self, system: &'a str) -> Result<BindingStream<'a>> {
        (**self).iter_bindings(system).await
    }

    fn validate_binding(&self, key: &ExternalKey, binding: &Binding) -> Result<()> {
        (**self).validate_binding(key, binding)
    }

    async fn get_item_state(&self, key: &ExternalKey) -> Result<Option<SyncItemState>> {
        (**self).get_item_state(key).await
    }

    async fn save_item_state(&self, state: &SyncItemState) -> Result<()> {
        (**self).save_item_state(state).await
    }
}
