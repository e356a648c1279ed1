//! The change-feed seam: where external data enters the engine.
//!
//! A [`Source`] produces a lazy stream of `(ExternalKey, Payload)` pairs
//! for one synchronized entity, together with the checkpoint the stream
//! advances to. The checkpoint side of a fetch comes back as a
//! [`NextCheckpoint`]: either a token resolved up front, or a deferred
//! [`CheckpointCell`] for sources that only know the final token after the
//! last page has been read.
//!
//! Two pagination helpers cover the common page-walking shapes:
//! [`paginate_eager`] collects all pages into memory, [`paginate_stream`]
//! yields pages lazily and publishes each page's next-token into a
//! [`CheckpointCell`] once that page has been fully consumed, so a
//! checkpoint never runs ahead of the items it covers.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use std::future::Future;

use crate::checkpoint::{CheckpointCell, NextCheckpoint};
use crate::errors::{Result, SyncError};
use crate::types::{ExternalKey, Payload};

/// Lazy sequence of keyed payloads, in the source's delivery order.
pub type ItemStream<'a, T> = BoxStream<'a, Result<(ExternalKey, Payload<T>)>>;

/// One page of items plus the token for the next page (`None` on the last).
pub type Page<T> = (Vec<(ExternalKey, Payload<T>)>, Option<String>);

/// Everything one fetch hands to the driver.
pub struct SourceBatch<'a, T> {
    /// Items changed since the `since` token, lazily produced.
    pub items: ItemStream<'a, T>,
    /// The checkpoint to persist once the items have been processed.
    pub next_checkpoint: NextCheckpoint,
}

impl<'a, T> SourceBatch<'a, T> {
    pub fn new(items: ItemStream<'a, T>, next_checkpoint: NextCheckpoint) -> Self {
        Self {
            items,
            next_checkpoint,
        }
    }

    /// Batch over an already-materialized list of items.
    pub fn from_items(
        items: Vec<(ExternalKey, Payload<T>)>,
        next_checkpoint: NextCheckpoint,
    ) -> Self
    where
        T: Send + 'a,
    {
        Self {
            items: stream::iter(items.into_iter().map(Ok)).boxed(),
            next_checkpoint,
        }
    }
}

/// Source of changes from an external system for one synchronized entity.
///
/// # Checkpoint discipline
///
/// `fetch` receives the token persisted by the previous run (or `None` on a
/// virgin stream) and must return the token the stream advances to. Sources
/// whose wire format needs validation run tokens through a
/// [`CheckpointCodec`](crate::checkpoint::CheckpointCodec); a source that
/// declares a checkpoint required must fail `fetch(None)` with a permanent
/// source error rather than fall back to a full scan.
#[async_trait]
pub trait Source: Send + Sync {
    /// Domain object carried by this source's payloads.
    type Item: Send + Sync;

    /// Produce the items changed since `since` and the next checkpoint.
    ///
    /// # Errors
    ///
    /// Temporary source errors for transport-level failures, permanent
    /// source errors for malformed data or a missing required checkpoint.
    /// Either aborts the run.
    async fn fetch<'s>(&'s self, since: Option<&'s str>) -> Result<SourceBatch<'s, Self::Item>>;

    /// Per-item technical validation, run before any mapping.
    ///
    /// # Errors
    ///
    /// Source errors for payloads that are structurally unusable.
    fn validate(&self, _key: &ExternalKey, _payload: &Payload<Self::Item>) -> Result<()> {
        Ok(())
    }
}

/// Walk a paged API to completion, collecting every page into memory.
///
/// `fetch_page(token)` returns one page and the token of the next, `None`
/// on the last page. Returns the collected items and the last non-`None`
/// token observed (the start token if the first page is also the last).
pub async fn paginate_eager<T, F, Fut>(
    start: Option<String>,
    mut fetch_page: F,
) -> Result<(Vec<(ExternalKey, Payload<T>)>, Option<String>)>
where
    T: Send,
    F: FnMut(Option<String>) -> Fut + Send,
    Fut: Future<Output = Result<Page<T>>> + Send,
{
    let mut items = Vec::new();
    let mut last_token = start.clone();
    let mut token = start;
    loop {
        let (page, next) = fetch_page(token).await?;
        items.extend(page);
        match next {
            Some(next) => {
                last_token = Some(next.clone());
                token = Some(next);
            }
            None => break,
        }
    }
    Ok((items, last_token))
}

/// Walk a paged API lazily.
///
/// Returns the item stream plus the [`CheckpointCell`] the stream writes
/// page tokens into; wrap the cell in [`NextCheckpoint::deferred`] when
/// building the [`SourceBatch`]. A page's next-token is published only
/// after every item of that page has been pulled from the stream, so a
/// checkpoint read from the cell never covers items that were not yet
/// handed to the driver.
pub fn paginate_stream<'a, T, F, Fut>(
    start: Option<String>,
    fetch_page: F,
) -> (ItemStream<'a, T>, CheckpointCell)
where
    T: Send + 'a,
    F: FnMut(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>>> + Send + 'a,
{
    let cell = CheckpointCell::new();
    cell.set(start.clone());
    let writer = cell.clone();

    let pages = stream::try_unfold(
        (fetch_page, start, None::<String>, false),
        move |(mut fetch_page, token, consumed, done)| {
            let writer = writer.clone();
            async move {
                if done {
                    return Ok(None);
                }
                // Being polled for a new page means the previous page has
                // been fully drained; only now is its token safe to publish.
                if let Some(consumed) = consumed {
                    writer.set(Some(consumed));
                }
                let (page, next) = fetch_page(token).await?;
                let done = next.is_none();
                Ok(Some((page, (fetch_page, next.clone(), next, done))))
            }
        },
    );

    let items = pages
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, SyncError>)))
        .try_flatten()
        .boxed();
    (items, cell)
}
