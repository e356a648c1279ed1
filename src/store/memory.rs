//! Volatile in-process state store for tests and ephemeral runs.

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use rustc_hash::FxHashMap;
use std::sync::RwLock;

use crate::errors::{Result, SyncError};
use crate::store::{BindingStream, StateStore};
use crate::types::{Binding, ExternalKey, KeyBinding, SyncItemState};

/// In-memory [`StateStore`]. Nothing survives the process; suitable for
/// tests, development, and dry runs.
#[derive(Default)]
pub struct InMemoryStateStore {
    checkpoints: RwLock<FxHashMap<String, String>>,
    bindings: RwLock<FxHashMap<ExternalKey, Binding>>,
    item_states: RwLock<FxHashMap<ExternalKey, SyncItemState>>,
}

impl InMemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> SyncError {
    SyncError::permanent_state(format!("lock poisoned: {what}"))
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_checkpoint(&self, stream: &str) -> Result<Option<String>> {
        let map = self
            .checkpoints
            .read()
            .map_err(|_| poisoned("checkpoints"))?;
        Ok(map.get(stream).cloned())
    }

    async fn save_checkpoint(&self, stream: &str, token: &str) -> Result<()> {
        let mut map = self
            .checkpoints
            .write()
            .map_err(|_| poisoned("checkpoints"))?;
        map.insert(stream.to_string(), token.to_string());
        Ok(())
    }

    async fn bind(
        &self,
        key: &ExternalKey,
        internal_id: &str,
        version: Option<&str>,
    ) -> Result<()> {
        let mut map = self.bindings.write().map_err(|_| poisoned("bindings"))?;
        map.insert(
            key.clone(),
            Binding::new(internal_id, version.map(str::to_string)),
        );
        Ok(())
    }

    async fn get_binding(&self, key: &ExternalKey) -> Result<Option<Binding>> {
        let map = self.bindings.read().map_err(|_| poisoned("bindings"))?;
        Ok(map.get(key).cloned())
    }

    async fn iter_bindings<'a>(&'a self, system: &'a str) -> Result<BindingStream<'a>> {
        let map = self.bindings.read().map_err(|_| poisoned("bindings"))?;
        let mut items: Vec<KeyBinding> = map
            .iter()
            .filter(|(key, _)| key.system == system)
            .map(|(key, binding)| KeyBinding {
                key: key.clone(),
                binding: binding.clone(),
            })
            .collect();
        // Hash order is not meaningful to callers, but deterministic output
        // keeps reconciliation diffs stable.
        items.sort_by(|a, b| a.key.key.cmp(&b.key.key));
        Ok(stream::iter(items.into_iter().map(Ok)).boxed())
    }

    async fn get_item_state(&self, key: &ExternalKey) -> Result<Option<SyncItemState>> {
        let map = self
            .item_states
            .read()
            .map_err(|_| poisoned("item_states"))?;
        Ok(map.get(key).cloned())
    }

    async fn save_item_state(&self, state: &SyncItemState) -> Result<()> {
        let mut map = self
            .item_states
            .write()
            .map_err(|_| poisoned("item_states"))?;
        map.insert(state.key.clone(), state.clone());
        Ok(())
    }
}
