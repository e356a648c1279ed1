//! # Syncline: Incremental Synchronization Engine
//!
//! Syncline is a generic driver for pulling changes out of an external
//! system, projecting each change into a target-shaped record, upserting it
//! into an internal system, and persisting enough state that the next run
//! resumes exactly where the previous one stopped.
//!
//! ## Core Concepts
//!
//! - **Stream**: a named synchronization channel (one source + one target
//!   pairing), the unit of checkpointing.
//! - **Checkpoint**: opaque per-stream resume token: a timestamp, a
//!   monotonic id, or an API cursor ([`checkpoint`]).
//! - **Version**: short string identifying a payload's content; equal
//!   versions short-circuit the pipeline, which is what makes at-least-once
//!   delivery safe ([`version`]).
//! - **Binding**: durable mapping from an external key to the internal id
//!   it materialized as, plus the last version written ([`types`]).
//! - **Item state machine**: per `(key, version)` each item is pending,
//!   succeeded, retryably failed, or permanently failed; retryable failures
//!   pin the checkpoint until their retry budget runs out ([`job`]).
//!
//! ## Quick Start
//!
//! Implement the three seams ([`source::Source`], [`mapper::Mapper`],
//! [`target::Target`]) and hand them to a [`job::SyncJob`]:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use syncline::checkpoint::NextCheckpoint;
//! use syncline::errors::Result;
//! use syncline::job::SyncJob;
//! use syncline::logger::TracingSyncLogger;
//! use syncline::mapper::Mapper;
//! use syncline::source::{Source, SourceBatch};
//! use syncline::store::InMemoryStateStore;
//! use syncline::target::Target;
//! use syncline::types::{Binding, ExternalKey, Payload, Projection};
//!
//! struct TicketSource;
//!
//! #[async_trait]
//! impl Source for TicketSource {
//!     type Item = serde_json::Value;
//!
//!     async fn fetch<'s>(
//!         &'s self,
//!         _since: Option<&'s str>,
//!     ) -> Result<SourceBatch<'s, Self::Item>> {
//!         let items = vec![(
//!             ExternalKey::new("tickets", "1"),
//!             Payload::new(serde_json::json!({"title": "hello"}), Some("v1".into())),
//!         )];
//!         Ok(SourceBatch::from_items(
//!             items,
//!             NextCheckpoint::resolved("2024-01-01T00:00:00+00:00"),
//!         ))
//!     }
//! }
//!
//! struct TicketMapper;
//!
//! #[async_trait]
//! impl Mapper for TicketMapper {
//!     type Input = serde_json::Value;
//!     type Output = serde_json::Value;
//!
//!     fn map(
//!         &self,
//!         _key: &ExternalKey,
//!         payload: &Payload<Self::Input>,
//!     ) -> Result<Projection<Self::Output>> {
//!         Ok(Projection::new("activity", payload.data.clone()))
//!     }
//! }
//!
//! struct TicketTarget;
//!
//! #[async_trait]
//! impl Target for TicketTarget {
//!     type Item = serde_json::Value;
//!
//!     async fn upsert(
//!         &self,
//!         key: &ExternalKey,
//!         _projection: &Projection<Self::Item>,
//!         _binding: Option<&Binding>,
//!     ) -> Result<String> {
//!         Ok(format!("internal-{}", key.key))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let job = SyncJob::new(
//!     "tickets->crm",
//!     TicketSource,
//!     TicketMapper,
//!     TicketTarget,
//!     InMemoryStateStore::new(),
//!     TracingSyncLogger::new(),
//! );
//! let result = job.run().await?;
//! println!(
//!     "created={} updated={} skipped={} failed={}",
//!     result.created, result.updated, result.skipped, result.failed
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure model
//!
//! Every failure is classified along two axes: origin (source / mapping /
//! target / state) and retryability (temporary / permanent), see
//! [`errors`]. Per-item failures never abort a run: temporary ones are
//! retried on later runs within a per-item attempt budget and block
//! checkpoint advancement while retries remain; permanent ones park the
//! item until its version changes. Only fetch failures abort the run.
//!
//! ## Module Guide
//!
//! - [`types`] - Keys, payloads, projections, bindings, item states, run counters
//! - [`errors`] - The two-axis error taxonomy
//! - [`checkpoint`] - Token codec and the deferred next-checkpoint cell
//! - [`version`] - Version-string constructors and canonical JSON
//! - [`source`] / [`mapper`] / [`target`] - The three extension seams
//! - [`store`] - State persistence (in-memory and SQLite backends)
//! - [`job`] - The sync job driver
//! - [`logger`] - Per-item lifecycle hooks
//! - [`client`] - Generic retrying HTTP client for integrations (feature `http`)
//! - [`telemetry`] - Tracing bootstrap

pub mod checkpoint;
#[cfg(feature = "http")]
pub mod client;
pub mod errors;
pub mod job;
pub mod logger;
pub mod mapper;
pub mod source;
pub mod store;
pub mod target;
pub mod telemetry;
pub mod types;
pub mod version;
