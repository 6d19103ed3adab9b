//! Durable bucket store backed by sled.
//!
//! Each namespace maps to its own `sled::Tree`. Stored values are prefixed with
//! the 8-byte big-endian revision of the write, allocated from the database's
//! monotonic id generator:
//!
//! ```text
//! ┌──────────────────┬─────────────────────┐
//! │ revision (u64 BE)│ payload (JSON bytes) │
//! └──────────────────┴─────────────────────┘
//! ```
//!
//! Writes to one namespace are serialized from revision allocation through
//! the flush, so revision order always matches commit order and watchers see
//! a key's revisions in increasing order.

use std::path::Path;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sled::Db;
use sled::Event;
use sled::Tree;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::instrument;
use tracing::trace;

use crate::constants::DEFAULT_WATCH_BUFFER_SIZE;
use crate::constants::SLED_WATCH_POLL_INTERVAL_MS;
use crate::BucketProvider;
use crate::KvBucket;
use crate::KvEntry;
use crate::StoreError;
use crate::WatchEvent;
use crate::Watcher;

const REVISION_PREFIX_LEN: usize = 8;

/// Provider opening one sled tree per bucket namespace
#[derive(Debug, Clone)]
pub struct SledKv {
    db: Db,
    /// One writer lock per namespace, shared by every bucket handle on it
    write_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    watch_buffer_size: usize,
}

impl SledKv {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self::from_db(db))
    }

    /// Database removed from disk once the last handle is dropped
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::from_db(db))
    }

    pub fn from_db(db: Db) -> Self {
        Self {
            db,
            write_locks: Arc::new(DashMap::new()),
            watch_buffer_size: DEFAULT_WATCH_BUFFER_SIZE,
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn with_watch_buffer_size(
        mut self,
        watch_buffer_size: usize,
    ) -> Self {
        self.watch_buffer_size = watch_buffer_size.max(1);
        self
    }
}

#[async_trait]
impl BucketProvider for SledKv {
    async fn bucket(
        &self,
        namespace: &str,
    ) -> Result<Arc<dyn KvBucket>, StoreError> {
        let tree = self
            .db
            .open_tree(namespace)
            .map_err(|e| StoreError::Unavailable {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            })?;

        let write_lock = self
            .write_locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let bucket: Arc<dyn KvBucket> = Arc::new(SledBucket {
            namespace: namespace.to_string(),
            db: self.db.clone(),
            tree,
            write_lock,
            watch_buffer_size: self.watch_buffer_size,
        });
        Ok(bucket)
    }
}

/// [`KvBucket`] over a single sled tree
#[derive(Debug)]
pub struct SledBucket {
    namespace: String,
    db: Db,
    tree: Tree,
    write_lock: Arc<Mutex<()>>,
    watch_buffer_size: usize,
}

fn encode_stored(
    revision: u64,
    payload: &[u8],
) -> Vec<u8> {
    let mut stored = Vec::with_capacity(REVISION_PREFIX_LEN + payload.len());
    stored.extend_from_slice(&revision.to_be_bytes());
    stored.extend_from_slice(payload);
    stored
}

fn decode_stored(
    key: &str,
    stored: &[u8],
) -> Result<KvEntry, StoreError> {
    if stored.len() < REVISION_PREFIX_LEN {
        return Err(StoreError::Backend(format!(
            "stored value of key {key} is missing its revision prefix"
        )));
    }
    let (prefix, payload) = stored.split_at(REVISION_PREFIX_LEN);
    let mut revision = [0u8; REVISION_PREFIX_LEN];
    revision.copy_from_slice(prefix);

    Ok(KvEntry {
        value: Bytes::copy_from_slice(payload),
        revision: u64::from_be_bytes(revision),
    })
}

fn key_to_string(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

/// Translates a raw sled event; returns `None` for values this adaptor did not write
fn translate_event(event: Event) -> Option<WatchEvent> {
    match event {
        Event::Insert { key, value } => {
            let key = key_to_string(&key);
            match decode_stored(&key, &value) {
                Ok(entry) => Some(WatchEvent::Put {
                    key,
                    value: entry.value,
                    revision: entry.revision,
                }),
                Err(e) => {
                    error!("Skipping foreign sled value: {:?}", e);
                    None
                }
            }
        }
        // sled does not report the revision of a removal
        Event::Remove { key } => Some(WatchEvent::Delete {
            key: key_to_string(&key),
            revision: 0,
        }),
    }
}

#[async_trait]
impl KvBucket for SledBucket {
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<KvEntry>, StoreError> {
        match self.tree.get(key)? {
            Some(stored) => decode_stored(key, &stored).map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, value), fields(namespace = %self.namespace))]
    async fn set(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;

        let revision = self.db.generate_id()?;
        self.tree.insert(key, encode_stored(revision, &value))?;
        self.tree.flush_async().await?;
        trace!(revision, "Value stored");
        Ok(revision)
    }

    async fn watch_all(&self) -> Result<Watcher, StoreError> {
        // Subscribe before reading so no write falls between replay and live feed
        let mut subscriber = self.tree.watch_prefix(Vec::<u8>::new());

        let mut replay = Vec::new();
        for item in self.tree.iter() {
            let (key, stored) = item?;
            let key = key_to_string(&key);
            let entry = decode_stored(&key, &stored)?;
            replay.push(WatchEvent::Put {
                key,
                value: entry.value,
                revision: entry.revision,
            });
        }
        replay.push(WatchEvent::InitialValuesDone);

        let (sender, watcher): (mpsc::Sender<WatchEvent>, Watcher) =
            Watcher::channel(self.watch_buffer_size);
        let namespace = self.namespace.clone();

        tokio::task::spawn_blocking(move || {
            for event in replay {
                if sender.blocking_send(event).is_err() {
                    return;
                }
            }

            let poll_interval = Duration::from_millis(SLED_WATCH_POLL_INTERVAL_MS);
            loop {
                match subscriber.next_timeout(poll_interval) {
                    Ok(event) => {
                        let Some(event) = translate_event(event) else {
                            continue;
                        };
                        if sender.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if sender.is_closed() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!(namespace = %namespace, "sled subscriber disconnected");
                        break;
                    }
                }
            }
            debug!(namespace = %namespace, "sled watch bridge stopped");
        });

        Ok(watcher)
    }
}
