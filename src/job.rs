//! The sync job driver: one synchronization pass for one stream.
//!
//! A [`SyncJob`] wires a [`Source`], [`Mapper`], [`Target`], [`StateStore`]
//! and [`SyncLogger`] together and drives one run: read the stream's
//! checkpoint, fetch changes, and for each item validate, short-circuit on
//! an unchanged version, project, upsert, and record the new binding and
//! item state.
//!
//! # Checkpoint advancement
//!
//! The persisted checkpoint is never advanced past an item whose failure is
//! still retryable on a future run. Mid-run batched saves (every
//! `checkpoint_save_every` successes) and the end-of-run save are both
//! gated on no outstanding retryable temporary error. An item whose
//! temporary error has exhausted its attempt budget no longer pins the
//! checkpoint: it is skipped on later runs until its version changes.
//!
//! # Per-item state machine
//!
//! ```text
//!                 ┌──────────────────────────────────┐
//!                 ▼                                  │
//!  (absent) → PENDING → SUCCESS                      │
//!              │  │                                  │
//!              │  └──► TEMP_ERROR ──(attempts<N)─────┘
//!              │           │
//!              │           └─(attempts=N)─► stuck (skipped until new version)
//!              └──► PERM_ERROR (terminal for this version)
//! ```
//!
//! A new payload with a different version for the same key resets the
//! machine: the stored state only counts when its version matches the
//! incoming payload's.

use futures_util::StreamExt;
use tracing::{debug, instrument};

use crate::errors::{Result, SyncError};
use crate::logger::{SkipReason, SyncLogger};
use crate::mapper::Mapper;
use crate::source::{Source, SourceBatch};
use crate::store::StateStore;
use crate::target::Target;
use crate::types::{ExternalKey, Payload, SyncItemState, SyncItemStatus, SyncResult};

/// Retry budget per `(key, version)` before an item stops pinning the
/// checkpoint.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Successes between batched checkpoint saves.
pub const DEFAULT_CHECKPOINT_SAVE_EVERY: usize = 100;

/// What became of one successfully processed item.
enum ItemOutcome {
    Created,
    Updated,
    SkippedSameVersion,
}

/// Driver for one synchronization stream.
///
/// Construct with [`SyncJob::new`], adjust the retry budget and checkpoint
/// batch size with the `with_*` methods, then call [`SyncJob::run`] once
/// per pass. Runs for different streams may execute concurrently; a single
/// stream is single-writer by contract.
pub struct SyncJob<S, M, T, St, L> {
    stream: String,
    source: S,
    mapper: M,
    target: T,
    state: St,
    logger: L,
    max_attempts: u32,
    checkpoint_save_every: usize,
}

impl<S, M, T, St, L> SyncJob<S, M, T, St, L>
where
    S: Source,
    M: Mapper<Input = S::Item>,
    T: Target<Item = M::Output>,
    St: StateStore,
    L: SyncLogger,
{
    pub fn new(
        stream: impl Into<String>,
        source: S,
        mapper: M,
        target: T,
        state: St,
        logger: L,
    ) -> Self {
        Self {
            stream: stream.into(),
            source,
            mapper,
            target,
            state,
            logger,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            checkpoint_save_every: DEFAULT_CHECKPOINT_SAVE_EVERY,
        }
    }

    /// Retry budget per `(key, version)`.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// How many successes accumulate before a mid-run checkpoint save.
    #[must_use]
    pub fn with_checkpoint_save_every(mut self, every: usize) -> Self {
        self.checkpoint_save_every = every.max(1);
        self
    }

    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Execute one synchronization pass.
    ///
    /// Per-item failures are recorded and counted but never abort the run;
    /// only fetch failures and state-store failures outside item processing
    /// do.
    ///
    /// # Errors
    ///
    /// Source errors from the fetch (logged under the stream's `__fetch__`
    /// sentinel key) and state errors from checkpoint or item-state
    /// persistence outside the per-item pipeline.
    #[instrument(skip(self), fields(stream = %self.stream), err)]
    pub async fn run(&self) -> Result<SyncResult> {
        let since = self.state.get_checkpoint(&self.stream).await?;
        let mut result = SyncResult::new();

        let batch = match self.source.fetch(since.as_deref()).await {
            Ok(batch) => batch,
            Err(err) => {
                self.log_fetch_error(&err);
                return Err(err);
            }
        };
        let SourceBatch {
            mut items,
            next_checkpoint,
        } = batch;

        let mut has_retryable_temp = false;
        let mut pending_since_save = 0usize;

        while let Some(item) = items.next().await {
            let (key, payload) = match item {
                Ok(pair) => pair,
                Err(err) => {
                    self.log_fetch_error(&err);
                    return Err(err);
                }
            };

            let stored = self.state.get_item_state(&key).await?;
            let prev = stored.filter(|state| state.version == payload.version);

            if let Some(prev) = &prev {
                match prev.status {
                    SyncItemStatus::PermError => {
                        self.logger.on_skipped(&key, SkipReason::PermError);
                        result = result.inc_skipped();
                        continue;
                    }
                    SyncItemStatus::TempError if prev.attempts >= self.max_attempts => {
                        self.logger.on_skipped(&key, SkipReason::MaxAttempts);
                        result = result.inc_skipped();
                        continue;
                    }
                    _ => {}
                }
            }

            match self.process_item(&key, &payload, prev.as_ref()).await {
                Ok(outcome) => {
                    result = match outcome {
                        ItemOutcome::Created => result.inc_created(),
                        ItemOutcome::Updated => result.inc_updated(),
                        ItemOutcome::SkippedSameVersion => result.inc_skipped(),
                    };
                    pending_since_save += 1;
                    if pending_since_save >= self.checkpoint_save_every && !has_retryable_temp {
                        if let Some(token) = next_checkpoint.peek() {
                            self.state.save_checkpoint(&self.stream, &token).await?;
                            pending_since_save = 0;
                        }
                    }
                }
                Err(err) => {
                    let attempts_before = prev.as_ref().map(|p| p.attempts).unwrap_or(0);
                    let status = if err.is_temporary() {
                        if attempts_before + 1 < self.max_attempts {
                            has_retryable_temp = true;
                        }
                        SyncItemStatus::TempError
                    } else {
                        // Covers both known-permanent and uncategorized
                        // errors.
                        // TODO: give uncategorized errors their own policy;
                        // recording them as PERM_ERROR conflates them with
                        // failures known to be unrecoverable.
                        SyncItemStatus::PermError
                    };
                    self.save_failed_state(&key, &payload, prev.as_ref(), status, &err)
                        .await?;
                    result = result.inc_failed();
                    self.logger.on_error(&key, &err);
                }
            }
        }
        drop(items);

        // Flush the tail of the last batch, then the resolved final
        // checkpoint; both stay pinned while a retryable failure remains.
        if pending_since_save > 0 && !has_retryable_temp {
            if let Some(token) = next_checkpoint.peek() {
                self.state.save_checkpoint(&self.stream, &token).await?;
            }
        }
        if !has_retryable_temp {
            if let Some(token) = next_checkpoint.resolve() {
                self.state.save_checkpoint(&self.stream, &token).await?;
            }
        } else {
            debug!(
                stream = %self.stream,
                "retryable failures outstanding, checkpoint not advanced"
            );
        }

        Ok(result)
    }

    /// Run one item through the full pipeline.
    async fn process_item(
        &self,
        key: &ExternalKey,
        payload: &Payload<S::Item>,
        prev: Option<&SyncItemState>,
    ) -> Result<ItemOutcome> {
        self.source.validate(key, payload)?;

        let bound = self.state.get_binding(key).await?;
        if let Some(binding) = &bound {
            self.state.validate_binding(key, binding)?;
            if binding.is_up_to_date_for(payload) {
                self.logger.on_skipped(key, SkipReason::SameVersion);
                self.save_success_state(key, payload, prev).await?;
                return Ok(ItemOutcome::SkippedSameVersion);
            }
        }

        self.mapper.validate(key, payload).await?;
        let projection = self.mapper.map(key, payload)?;
        self.target.validate(key, &projection)?;
        let internal_id = self.target.upsert(key, &projection, bound.as_ref()).await?;
        self.state
            .bind(key, &internal_id, payload.version.as_deref())
            .await?;
        self.save_success_state(key, payload, prev).await?;

        if bound.is_some() {
            self.logger.on_updated(key, &internal_id);
            Ok(ItemOutcome::Updated)
        } else {
            self.logger.on_created(key, &internal_id);
            Ok(ItemOutcome::Created)
        }
    }

    async fn save_success_state(
        &self,
        key: &ExternalKey,
        payload: &Payload<S::Item>,
        prev: Option<&SyncItemState>,
    ) -> Result<()> {
        let attempts = prev.map(|p| p.attempts + 1).unwrap_or(1);
        self.state
            .save_item_state(&SyncItemState::new(
                key.clone(),
                payload.version.clone(),
                SyncItemStatus::Success,
                attempts,
                None,
            ))
            .await
    }

    async fn save_failed_state(
        &self,
        key: &ExternalKey,
        payload: &Payload<S::Item>,
        prev: Option<&SyncItemState>,
        status: SyncItemStatus,
        error: &SyncError,
    ) -> Result<()> {
        let attempts = prev.map(|p| p.attempts + 1).unwrap_or(1);
        self.state
            .save_item_state(&SyncItemState::new(
                key.clone(),
                payload.version.clone(),
                status,
                attempts,
                Some(error.to_string()),
            ))
            .await
    }

    /// Report a failure that happened before any item was in hand.
    fn log_fetch_error(&self, error: &SyncError) {
        let key = ExternalKey::fetch_sentinel(&self.stream);
        self.logger.on_error(&key, error);
    }
}
