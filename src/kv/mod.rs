//! Key-value bucket facade consumed by the whitelist cache.
//!
//! A bucket is a named partition of an external key-value store. The cache
//! only needs three things from it: point reads, point writes and a change
//! feed covering every key in the bucket.
//!
//! ```text
//! ┌───────────────┐   get / set    ┌──────────────┐
//! │   Whitelist   │ ─────────────▶ │   KvBucket   │
//! │  (write path) │                │              │
//! └───────────────┘                └──────┬───────┘
//!         ▲                               │ watch_all()
//!         │ apply under lock              ▼
//! ┌───────────────┐   WatchEvent   ┌──────────────┐
//! │   ApplyLoop   │ ◀───────────── │   Watcher    │
//! └───────────────┘                └──────────────┘
//! ```
//!
//! Every write is stamped with a store-assigned revision that increases
//! monotonically within a bucket. Watch events carry the same revision, which
//! lets a subscriber tell an old echo of its own write from a newer write made
//! by a peer.

mod adaptors;
mod typed;

pub use adaptors::*;
pub use typed::*;


use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::StoreError;

/// Raw value stored under a key together with the revision that wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub value: Bytes,
    pub revision: u64,
}

/// Change notification delivered by [`KvBucket::watch_all`]
///
/// A `revision` of 0 means the store could not tell when the change happened;
/// such events are applied unconditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Key was inserted or updated
    Put {
        key: String,
        value: Bytes,
        revision: u64,
    },
    /// Key was removed from the bucket
    Delete { key: String, revision: u64 },
    /// Marker emitted once after the current values have been replayed.
    /// Carries no data.
    InitialValuesDone,
}

impl WatchEvent {
    pub fn key(&self) -> Option<&str> {
        match self {
            WatchEvent::Put { key, .. } | WatchEvent::Delete { key, .. } => Some(key),
            WatchEvent::InitialValuesDone => None,
        }
    }
}

/// Subscription to a bucket's change feed
///
/// Dropping the watcher ends the subscription; the bucket notices the closed
/// channel and stops delivering to it.
#[derive(Debug)]
pub struct Watcher {
    receiver: mpsc::Receiver<WatchEvent>,
}

impl Watcher {
    pub fn new(receiver: mpsc::Receiver<WatchEvent>) -> Self {
        Self { receiver }
    }

    /// Creates a bounded feed and the watcher reading from it
    pub fn channel(buffer_size: usize) -> (mpsc::Sender<WatchEvent>, Self) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        (sender, Self::new(receiver))
    }

    /// Waits for the next event. `None` means the store closed the feed.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.receiver.recv().await
    }

    pub fn into_stream(self) -> ReceiverStream<WatchEvent> {
        ReceiverStream::new(self.receiver)
    }
}

/// A single namespaced partition of the key-value store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvBucket: Send + Sync + 'static {
    /// Returns `Ok(None)` when the key has never been written
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KvEntry>, StoreError>;

    /// Stores `value` under `key` and returns the revision of the write
    async fn set(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<u64, StoreError>;

    /// Subscribes to every key in the bucket.
    ///
    /// Implementations replay the current value of each key, emit
    /// [`WatchEvent::InitialValuesDone`], then forward live changes, including
    /// the ones made through this same bucket handle.
    async fn watch_all(&self) -> Result<Watcher, StoreError>;
}

/// Opens buckets by namespace, creating them on first use
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BucketProvider: Send + Sync + 'static {
    async fn bucket(
        &self,
        namespace: &str,
    ) -> Result<Arc<dyn KvBucket>, StoreError>;
}
