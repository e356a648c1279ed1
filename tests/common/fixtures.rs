#![allow(dead_code)]

//! Shared dummy components for driving [`SyncJob`](syncline::job::SyncJob)
//! end to end without any real external system.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use syncline::checkpoint::{CheckpointCell, CheckpointCodec, CheckpointKind, NextCheckpoint};
use syncline::errors::{Result, SyncError};
use syncline::logger::{SkipReason, SyncLogger};
use syncline::mapper::Mapper;
use syncline::source::{Source, SourceBatch};
use syncline::store::{BindingStream, InMemoryStateStore, StateStore};
use syncline::target::Target;
use syncline::types::{Binding, ExternalKey, Payload, Projection, SyncItemState};

pub fn key(k: &str) -> ExternalKey {
    ExternalKey::new("sys", k)
}

/// Source that yields `count` items keyed `"1"..="count"`, advancing a
/// deferred checkpoint cell to `cp-<i>` as item `i` is produced.
pub struct CountingSource {
    count: u32,
}

impl CountingSource {
    pub fn new(count: u32) -> Self {
        Self { count }
    }
}

#[async_trait]
impl Source for CountingSource {
    type Item = String;

    async fn fetch<'s>(&'s self, _since: Option<&'s str>) -> Result<SourceBatch<'s, String>> {
        let cell = CheckpointCell::new();
        let writer = cell.clone();
        let items = stream::iter(1..=self.count)
            .map(move |i| {
                writer.set(Some(format!("cp-{i}")));
                Ok((
                    ExternalKey::new("sys", i.to_string()),
                    Payload::new(format!("item-{i}"), Some(i.to_string())),
                ))
            })
            .boxed();
        Ok(SourceBatch::new(items, NextCheckpoint::deferred(cell)))
    }
}

/// Source over a fixed item list with an up-front resolved checkpoint.
pub struct FixedSource {
    items: Vec<(ExternalKey, Payload<String>)>,
    next: Option<String>,
}

impl FixedSource {
    pub fn new(items: Vec<(ExternalKey, Payload<String>)>, next: Option<&str>) -> Self {
        Self {
            items,
            next: next.map(str::to_string),
        }
    }

    pub fn single(k: &str, data: &str, version: &str, next: Option<&str>) -> Self {
        Self::new(
            vec![(key(k), Payload::new(data.to_string(), Some(version.to_string())))],
            next,
        )
    }
}

#[async_trait]
impl Source for FixedSource {
    type Item = String;

    async fn fetch<'s>(&'s self, _since: Option<&'s str>) -> Result<SourceBatch<'s, String>> {
        let next = match &self.next {
            Some(token) => NextCheckpoint::resolved(token.clone()),
            None => NextCheckpoint::none(),
        };
        Ok(SourceBatch::from_items(self.items.clone(), next))
    }
}

/// Incremental source that refuses to run without a prior checkpoint.
pub struct CheckpointRequiredSource {
    codec: CheckpointCodec,
}

impl CheckpointRequiredSource {
    pub fn new() -> Self {
        Self {
            codec: CheckpointCodec::new(CheckpointKind::UpdatedAt),
        }
    }
}

impl Default for CheckpointRequiredSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for CheckpointRequiredSource {
    type Item = String;

    async fn fetch<'s>(&'s self, since: Option<&'s str>) -> Result<SourceBatch<'s, String>> {
        self.codec.ensure_checkpoint(since)?;
        Ok(SourceBatch::from_items(vec![], NextCheckpoint::none()))
    }
}

/// Mapper that projects the payload through unchanged, optionally rejecting
/// one key with a permanent mapping error.
#[derive(Default)]
pub struct DummyMapper {
    perm_fail_on: Option<String>,
}

impl DummyMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(key: &str) -> Self {
        Self {
            perm_fail_on: Some(key.to_string()),
        }
    }
}

#[async_trait]
impl Mapper for DummyMapper {
    type Input = String;
    type Output = String;

    async fn validate(&self, key: &ExternalKey, _payload: &Payload<String>) -> Result<()> {
        if self.perm_fail_on.as_deref() == Some(key.key.as_str()) {
            return Err(SyncError::permanent_mapping(format!(
                "business rule rejected {key}"
            )));
        }
        Ok(())
    }

    fn map(&self, _key: &ExternalKey, payload: &Payload<String>) -> Result<Projection<String>> {
        Ok(Projection::new("kind", payload.data.clone()))
    }
}

/// Target that records upserted keys, optionally failing one key with a
/// temporary target error.
pub struct DummyTarget {
    fail_on: Option<String>,
    uncategorized: bool,
    upserted: Arc<Mutex<Vec<String>>>,
}

impl DummyTarget {
    pub fn new() -> Self {
        Self {
            fail_on: None,
            uncategorized: false,
            upserted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_on(key: &str) -> Self {
        Self {
            fail_on: Some(key.to_string()),
            uncategorized: false,
            upserted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails one key with an error that carries no retryability axis.
    pub fn failing_uncategorized(key: &str) -> Self {
        Self {
            fail_on: Some(key.to_string()),
            uncategorized: true,
            upserted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle that survives moving the target into a job.
    pub fn upsert_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.upserted)
    }
}

impl Default for DummyTarget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Target for DummyTarget {
    type Item = String;

    async fn upsert(
        &self,
        key: &ExternalKey,
        _projection: &Projection<String>,
        _binding: Option<&Binding>,
    ) -> Result<String> {
        if self.fail_on.as_deref() == Some(key.key.as_str()) {
            if self.uncategorized {
                return Err(SyncError::uncategorized("mystery failure"));
            }
            return Err(SyncError::temporary_target("temp fail"));
        }
        self.upserted.lock().unwrap().push(key.key.clone());
        Ok(format!("internal-{}", key.key))
    }
}

/// In-memory store that additionally journals every checkpoint save, in
/// order.
#[derive(Default)]
pub struct RecordingStateStore {
    inner: InMemoryStateStore,
    saved: Mutex<Vec<String>>,
}

impl RecordingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved_checkpoints(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateStore for RecordingStateStore {
    async fn get_checkpoint(&self, stream: &str) -> Result<Option<String>> {
        self.inner.get_checkpoint(stream).await
    }

    async fn save_checkpoint(&self, stream: &str, token: &str) -> Result<()> {
        self.saved.lock().unwrap().push(token.to_string());
        self.inner.save_checkpoint(stream, token).await
    }

    async fn bind(
        &self,
        key: &ExternalKey,
        internal_id: &str,
        version: Option<&str>,
    ) -> Result<()> {
        self.inner.bind(key, internal_id, version).await
    }

    async fn get_binding(&self, key: &ExternalKey) -> Result<Option<Binding>> {
        self.inner.get_binding(key).await
    }

    async fn iter_bindings<'a>(&'a self, system: &'a str) -> Result<BindingStream<'a>> {
        self.inner.iter_bindings(system).await
    }

    async fn get_item_state(&self, key: &ExternalKey) -> Result<Option<SyncItemState>> {
        self.inner.get_item_state(key).await
    }

    async fn save_item_state(&self, state: &SyncItemState) -> Result<()> {
        self.inner.save_item_state(state).await
    }
}

/// What a [`RecordingLogger`] saw, keyed by the item's `key` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogEvent {
    Skipped(String, SkipReason),
    Created(String, String),
    Updated(String, String),
    Deleted(String, String),
    Error(String, String),
}

/// Logger that journals every hook invocation.
#[derive(Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncLogger for RecordingLogger {
    fn on_skipped(&self, key: &ExternalKey, reason: SkipReason) {
        self.events
            .lock()
            .unwrap()
            .push(LogEvent::Skipped(key.key.clone(), reason));
    }

    fn on_created(&self, key: &ExternalKey, internal_id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(LogEvent::Created(key.key.clone(), internal_id.to_string()));
    }

    fn on_updated(&self, key: &ExternalKey, internal_id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(LogEvent::Updated(key.key.clone(), internal_id.to_string()));
    }

    fn on_deleted(&self, key: &ExternalKey, internal_id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(LogEvent::Deleted(key.key.clone(), internal_id.to_string()));
    }

    fn on_error(&self, key: &ExternalKey, error: &SyncError) {
        self.events
            .lock()
            .unwrap()
            .push(LogEvent::Error(key.key.clone(), error.to_string()));
    }
}
