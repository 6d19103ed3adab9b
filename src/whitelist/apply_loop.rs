//! Background task turning change events into local state mutations.
//!
//! Every event is applied while holding the sync gate, which serializes it
//! against write-through persists and reloads. Decoding happens before the
//! state lock is taken, so a malformed payload never leaves the lock held.
//! A closed feed is replaced by a new subscription.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::state::Revisions;
use super::state::StateGuard;
use super::state::TrackedKey;
use super::state::WhitelistState;
use crate::constants::WATCH_RESUBSCRIBE_BACKOFF_MS;
use crate::decode;
use crate::metrics::MALFORMED_WATCH_EVENTS;
use crate::metrics::WATCH_EVENTS_APPLIED;
use crate::metrics::WATCH_EVENTS_STALE;
use crate::metrics::WATCH_RESUBSCRIPTIONS;
use crate::KvBucket;
use crate::StoreError;
use crate::WatchEvent;
use crate::Watcher;

/// Result of handing one event to [`apply_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State updated
    Applied,
    /// Local state already reflects this revision or a newer one
    Stale,
    /// Payload could not be decoded; state untouched
    Malformed,
    /// Marker or a key this cache does not mirror
    Ignored,
}

/// Decoded value of one tracked key
#[derive(Debug)]
enum FieldValue {
    Enabled(bool),
    Members(Vec<String>),
}

impl FieldValue {
    fn decode(
        key: TrackedKey,
        raw: &[u8],
    ) -> Result<Self, StoreError> {
        match key {
            TrackedKey::Enabled => decode(key.as_str(), raw).map(FieldValue::Enabled),
            TrackedKey::Whitelisted => decode(key.as_str(), raw).map(FieldValue::Members),
        }
    }

    /// Value a key takes when it is absent from the store
    fn absent(key: TrackedKey) -> Self {
        match key {
            TrackedKey::Enabled => FieldValue::Enabled(false),
            TrackedKey::Whitelisted => FieldValue::Members(Vec::new()),
        }
    }

    fn commit(
        self,
        state: &mut WhitelistState,
    ) {
        match self {
            FieldValue::Enabled(enabled) => state.enabled = enabled,
            FieldValue::Members(members) => state.members = members,
        }
    }
}

/// Applies a single change event to `state`.
///
/// The caller must hold the sync gate that owns `revisions`.
pub(crate) fn apply_event(
    state: &StateGuard,
    revisions: &mut Revisions,
    event: WatchEvent,
) -> ApplyOutcome {
    let Some(key) = event.key() else {
        debug!("Initial values replayed");
        return ApplyOutcome::Ignored;
    };

    let Some(tracked) = TrackedKey::from_key(key) else {
        trace!(key, "Ignoring change of untracked key");
        return ApplyOutcome::Ignored;
    };

    let (revision, value) = match event {
        WatchEvent::Put { value, revision, .. } => (revision, Some(value)),
        WatchEvent::Delete { revision, .. } => (revision, None),
        WatchEvent::InitialValuesDone => return ApplyOutcome::Ignored,
    };
    let key = tracked.as_str();

    if revisions.is_stale(tracked, revision) {
        trace!(key, revision, known = revisions.get(tracked), "Skipping stale change");
        WATCH_EVENTS_STALE.with_label_values(&[key]).inc();
        return ApplyOutcome::Stale;
    }

    let field = match value {
        Some(raw) => {
            debug!("{} key changed: {}", key, String::from_utf8_lossy(&raw));
            match FieldValue::decode(tracked, &raw) {
                Ok(field) => field,
                Err(e) => {
                    error!("Failed to decode {} key: {:?}", key, e);
                    MALFORMED_WATCH_EVENTS.with_label_values(&[key]).inc();
                    return ApplyOutcome::Malformed;
                }
            }
        }
        None => {
            debug!("{} key deleted, falling back to default", key);
            FieldValue::absent(tracked)
        }
    };

    state.write(|state| field.commit(state));
    revisions.observe(tracked, revision);
    WATCH_EVENTS_APPLIED.with_label_values(&[key]).inc();

    ApplyOutcome::Applied
}

pub(crate) struct ApplyLoop {
    namespace: String,
    state: StateGuard,
    gate: Arc<Mutex<Revisions>>,
    bucket: Arc<dyn KvBucket>,
    feed: ReceiverStream<WatchEvent>,
    shutdown: CancellationToken,
}

impl ApplyLoop {
    pub(crate) fn new(
        namespace: String,
        state: StateGuard,
        gate: Arc<Mutex<Revisions>>,
        bucket: Arc<dyn KvBucket>,
        watcher: Watcher,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            namespace,
            state,
            gate,
            bucket,
            feed: watcher.into_stream(),
            shutdown,
        }
    }

    /// Drains the change feed until shutdown is requested.
    ///
    /// When the store closes the feed (for example after evicting a lagging
    /// subscriber) the loop subscribes again. The fresh replay brings every
    /// key back to its current value, and stale replays are skipped by
    /// revision. The loop stops if resubscribing fails.
    pub(crate) async fn run(mut self) {
        info!(namespace = %self.namespace, "Whitelist apply loop started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(namespace = %self.namespace, "Apply loop received shutdown signal");
                    break;
                }
                event = self.feed.next() => {
                    match event {
                        Some(event) => {
                            let mut revisions = self.gate.lock().await;
                            let outcome = apply_event(&self.state, &mut revisions, event);
                            trace!(namespace = %self.namespace, ?outcome, "Change handled");
                        }
                        None => {
                            warn!(namespace = %self.namespace, "Watch subscription closed by store, resubscribing");
                            if let Err(e) = self.resubscribe().await {
                                error!(namespace = %self.namespace, "Failed to resubscribe, stopping apply loop: {:?}", e);
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!(namespace = %self.namespace, "Whitelist apply loop stopped");
    }

    async fn resubscribe(&mut self) -> Result<(), StoreError> {
        tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(()),
            _ = sleep(Duration::from_millis(WATCH_RESUBSCRIBE_BACKOFF_MS)) => {}
        }

        let watcher = self.bucket.watch_all().await?;
        self.feed = watcher.into_stream();
        WATCH_RESUBSCRIPTIONS.inc();
        Ok(())
    }
}
