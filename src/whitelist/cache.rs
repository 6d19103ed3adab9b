use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::apply_loop::ApplyLoop;
use super::state::Revisions;
use super::state::StateGuard;
use super::state::TrackedKey;
use super::state::WhitelistState;
use crate::get_versioned;
use crate::metrics::STORE_WRITE_FAILURES;
use crate::set_typed;
use crate::BucketProvider;
use crate::KvBucket;
use crate::Result;
use crate::StoreError;
use crate::WhitelistConfig;

/// Whitelist cache synchronized with a key-value bucket
///
/// Holds an in-memory copy of the `enabled` flag and the member list. Reads
/// never touch the store. Mutations update memory first and then write the
/// new value through to the bucket. A background apply loop merges changes
/// made by other processes.
///
/// Two locks are involved:
/// - the state lock (`parking_lot::RwLock`) guards `enabled` and `members` and
///   is never held across I/O;
/// - the sync gate (`tokio::sync::Mutex`) serializes write-through persists,
///   applied events and reloads, and owns the per-key revision ledger used to
///   discard stale events.
pub struct Whitelist {
    namespace: String,
    state: StateGuard,
    gate: Arc<Mutex<Revisions>>,
    bucket: Arc<dyn KvBucket>,
    shutdown: CancellationToken,
    apply_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Whitelist {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Whitelist")
            .field("namespace", &self.namespace)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Whitelist {
    /// Opens the cache on `namespace` with default configuration
    pub async fn new<P>(
        provider: &P,
        namespace: &str,
    ) -> Result<Self>
    where
        P: BucketProvider + ?Sized,
    {
        Self::with_config(provider, namespace, &WhitelistConfig::default()).await
    }

    /// Opens the cache on the bucket owned by `network_key`
    pub async fn for_network<P>(
        provider: &P,
        network_key: &str,
        config: &WhitelistConfig,
    ) -> Result<Self>
    where
        P: BucketProvider + ?Sized,
    {
        let namespace = config.namespace_for(network_key);
        Self::with_config(provider, &namespace, config).await
    }

    /// Opens the bucket, subscribes to its change feed and spawns the apply loop.
    ///
    /// State starts as disabled with no members. The store's current values
    /// arrive through the change feed, or synchronously when
    /// `reload_on_start` is set.
    ///
    /// # Errors
    /// - [`StoreError::Unavailable`] if the bucket or its change feed cannot be opened
    /// - any [`StoreError`] raised by the initial reload
    pub async fn with_config<P>(
        provider: &P,
        namespace: &str,
        config: &WhitelistConfig,
    ) -> Result<Self>
    where
        P: BucketProvider + ?Sized,
    {
        let unavailable = |e: StoreError| match e {
            StoreError::Unavailable { .. } => e,
            other => StoreError::Unavailable {
                namespace: namespace.to_string(),
                reason: other.to_string(),
            },
        };

        let bucket = provider.bucket(namespace).await.map_err(unavailable)?;
        let watcher = bucket.watch_all().await.map_err(unavailable)?;

        let state = StateGuard::default();
        let gate = Arc::new(Mutex::new(Revisions::default()));
        let shutdown = CancellationToken::new();

        let apply_loop = ApplyLoop::new(
            namespace.to_string(),
            state.clone(),
            gate.clone(),
            bucket.clone(),
            watcher,
            shutdown.child_token(),
        );
        let handle = tokio::spawn(apply_loop.run());

        let whitelist = Self {
            namespace: namespace.to_string(),
            state,
            gate,
            bucket,
            shutdown,
            apply_task: SyncMutex::new(Some(handle)),
        };

        if config.reload_on_start {
            whitelist.reload().await?;
        }

        info!(namespace, "Whitelist cache ready");
        Ok(whitelist)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Replaces the local state with the store's current values.
    ///
    /// Missing keys fall back to `enabled = false` and no members. Any other
    /// read or decode failure aborts the reload and leaves the previous state
    /// untouched. Both fields are committed together.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn reload(&self) -> Result<()> {
        let mut revisions = self.gate.lock().await;

        let enabled = get_versioned::<bool>(&*self.bucket, TrackedKey::Enabled.as_str()).await?;
        let members =
            get_versioned::<Vec<String>>(&*self.bucket, TrackedKey::Whitelisted.as_str()).await?;

        let (enabled, enabled_revision) = enabled.map(|v| (v.value, v.revision)).unwrap_or_default();
        let (members, members_revision) = members.map(|v| (v.value, v.revision)).unwrap_or_default();

        debug!(enabled, members = members.len(), "Reloaded whitelist from store");

        self.state.write(|state| {
            state.enabled = enabled;
            state.members = members;
        });
        revisions.observe(TrackedKey::Enabled, enabled_revision);
        revisions.observe(TrackedKey::Whitelisted, members_revision);

        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.state.read(|state| state.enabled)
    }

    pub async fn enable(&self) -> Result<()> {
        self.set_enabled(true).await
    }

    pub async fn disable(&self) -> Result<()> {
        self.set_enabled(false).await
    }

    /// Appends `id` to the member list. Adding an id twice keeps both entries.
    pub async fn add(
        &self,
        id: impl Into<String>,
    ) -> Result<()> {
        let id = id.into();
        let mut revisions = self.gate.lock().await;

        let members = self.state.write(|state| {
            state.members.push(id);
            state.members.clone()
        });

        self.persist(&mut revisions, TrackedKey::Whitelisted, &members).await
    }

    /// Removes every occurrence of `id` from the member list
    pub async fn remove(
        &self,
        id: &str,
    ) -> Result<()> {
        let mut revisions = self.gate.lock().await;

        let members = self.state.write(|state| {
            state.members.retain(|member| member != id);
            state.members.clone()
        });

        self.persist(&mut revisions, TrackedKey::Whitelisted, &members).await
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.state.read(|state| state.members.iter().any(|member| member == id))
    }

    /// Copy of the member list in insertion order
    pub fn all_whitelisted(&self) -> Vec<String> {
        self.state.read(|state| state.members.clone())
    }

    /// Consistent copy of both fields
    pub fn snapshot(&self) -> WhitelistState {
        self.state.read(|state| state.clone())
    }

    /// Returns true while the apply loop is consuming the change feed
    pub fn is_syncing(&self) -> bool {
        self.apply_task
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stops the apply loop and waits for it to release its subscription.
    ///
    /// The cache stays readable and writable afterwards but no longer sees
    /// remote changes. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();

        let handle = self.apply_task.lock().take();
        if let Some(handle) = handle {
            handle.await?;
            debug!(namespace = %self.namespace, "Apply loop joined");
        }
        Ok(())
    }

    async fn set_enabled(
        &self,
        enabled: bool,
    ) -> Result<()> {
        let mut revisions = self.gate.lock().await;

        self.state.write(|state| state.enabled = enabled);

        self.persist(&mut revisions, TrackedKey::Enabled, &enabled).await
    }

    /// Writes `value` through to the bucket. The caller holds the sync gate.
    async fn persist<T>(
        &self,
        revisions: &mut Revisions,
        key: TrackedKey,
        value: &T,
    ) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        match set_typed(&*self.bucket, key.as_str(), value).await {
            Ok(revision) => {
                revisions.observe(key, revision);
                Ok(())
            }
            Err(e) => {
                STORE_WRITE_FAILURES.with_label_values(&[key.as_str()]).inc();
                warn!(
                    namespace = %self.namespace,
                    key = key.as_str(),
                    "Failed to persist whitelist change, local state may diverge until the next change or reload: {:?}",
                    e
                );
                Err(e.into())
            }
        }
    }
}

impl Drop for Whitelist {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
