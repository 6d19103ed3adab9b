//! In-process bucket store.
//!
//! Buckets live in a `DashMap` keyed by namespace. Each bucket keeps its data
//! and its watcher list behind one lock so that a write and its notification
//! are ordered the same way for every subscriber.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::constants::DEFAULT_WATCH_BUFFER_SIZE;
use crate::BucketProvider;
use crate::KvBucket;
use crate::KvEntry;
use crate::StoreError;
use crate::WatchEvent;
use crate::Watcher;

/// Provider handing out [`MemoryBucket`]s that share this process' memory
#[derive(Debug)]
pub struct MemoryKv {
    buckets: DashMap<String, Arc<MemoryBucket>>,
    watch_buffer_size: usize,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_watch_buffer_size(DEFAULT_WATCH_BUFFER_SIZE)
    }

    pub fn with_watch_buffer_size(watch_buffer_size: usize) -> Self {
        Self {
            buckets: DashMap::new(),
            watch_buffer_size: watch_buffer_size.max(1),
        }
    }

    /// Opens (or creates) the concrete bucket for `namespace`
    pub fn memory_bucket(
        &self,
        namespace: &str,
    ) -> Arc<MemoryBucket> {
        self.buckets
            .entry(namespace.to_string())
            .or_insert_with(|| {
                debug!(namespace, "Creating in-memory bucket");
                Arc::new(MemoryBucket::new(namespace, self.watch_buffer_size))
            })
            .clone()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[async_trait]
impl BucketProvider for MemoryKv {
    async fn bucket(
        &self,
        namespace: &str,
    ) -> Result<Arc<dyn KvBucket>, StoreError> {
        if namespace.is_empty() {
            return Err(StoreError::Unavailable {
                namespace: namespace.to_string(),
                reason: "bucket namespace must not be empty".to_string(),
            });
        }

        let bucket: Arc<dyn KvBucket> = self.memory_bucket(namespace);
        Ok(bucket)
    }
}

#[derive(Debug, Default)]
struct BucketInner {
    data: HashMap<String, KvEntry>,
    watchers: Vec<mpsc::Sender<WatchEvent>>,
    last_revision: u64,
}

impl BucketInner {
    fn next_revision(&mut self) -> u64 {
        self.last_revision += 1;
        self.last_revision
    }

    /// Delivers `event` to every live watcher, pruning closed ones.
    ///
    /// A watcher whose buffer is full is evicted: its feed closes after the
    /// events already queued, and the subscriber must call `watch_all` again
    /// to get a fresh replay. The writer never waits on a slow reader.
    fn broadcast(
        &mut self,
        namespace: &str,
        event: WatchEvent,
    ) {
        self.watchers.retain(|watcher| match watcher.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(namespace, key = ?event.key(), "Watcher lagging behind, closing its feed");
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!(namespace, "Pruning closed watcher");
                false
            }
        });
    }
}

/// In-memory [`KvBucket`] with a synchronous change feed
#[derive(Debug)]
pub struct MemoryBucket {
    namespace: String,
    inner: RwLock<BucketInner>,
    watch_buffer_size: usize,
}

impl MemoryBucket {
    pub fn new(
        namespace: &str,
        watch_buffer_size: usize,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            inner: RwLock::new(BucketInner::default()),
            watch_buffer_size: watch_buffer_size.max(1),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Removes `key`, notifying watchers if it existed.
    pub fn delete(
        &self,
        key: &str,
    ) -> Option<u64> {
        let mut inner = self.inner.write();
        inner.data.remove(key)?;
        let revision = inner.next_revision();
        inner.broadcast(
            &self.namespace,
            WatchEvent::Delete {
                key: key.to_string(),
                revision,
            },
        );
        Some(revision)
    }

    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.read().watchers.len()
    }
}

#[async_trait]
impl KvBucket for MemoryBucket {
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KvEntry>, StoreError> {
        Ok(self.inner.read().data.get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write();
        let revision = inner.next_revision();
        inner.data.insert(
            key.to_string(),
            KvEntry {
                value: value.clone(),
                revision,
            },
        );
        inner.broadcast(
            &self.namespace,
            WatchEvent::Put {
                key: key.to_string(),
                value,
                revision,
            },
        );
        trace!(namespace = %self.namespace, key, revision, "Value stored");
        Ok(revision)
    }

    async fn watch_all(&self) -> Result<Watcher, StoreError> {
        let mut inner = self.inner.write();

        // Room for the replay and the marker on top of the live buffer
        let capacity = self.watch_buffer_size + inner.data.len() + 1;
        let (sender, watcher) = Watcher::channel(capacity);

        let mut replay: Vec<WatchEvent> = inner
            .data
            .iter()
            .map(|(key, entry)| WatchEvent::Put {
                key: key.clone(),
                value: entry.value.clone(),
                revision: entry.revision,
            })
            .collect();
        replay.sort_by_key(|event| match event {
            WatchEvent::Put { revision, .. } => *revision,
            _ => 0,
        });
        replay.push(WatchEvent::InitialValuesDone);

        for event in replay {
            if sender.try_send(event).is_err() {
                return Err(StoreError::Backend(format!(
                    "failed to replay current values of bucket {}",
                    self.namespace
                )));
            }
        }

        inner.watchers.push(sender);
        debug!(namespace = %self.namespace, watchers = inner.watchers.len(), "Watcher registered");
        Ok(watcher)
    }
}
