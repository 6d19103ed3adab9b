use std::sync::Arc;

use parking_lot::RwLock;

use crate::constants::KEY_ENABLED;
use crate::constants::KEY_WHITELISTED;

/// Local projection of the two whitelist keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistState {
    pub enabled: bool,
    /// Insertion ordered; duplicates are kept
    pub members: Vec<String>,
}

/// The whole state behind one reader/writer lock
#[derive(Debug, Clone, Default)]
pub(crate) struct StateGuard {
    inner: Arc<RwLock<WhitelistState>>,
}

impl StateGuard {
    /// Provides read access to the state
    pub(crate) fn read<R>(
        &self,
        f: impl FnOnce(&WhitelistState) -> R,
    ) -> R {
        let guard = self.inner.read();
        f(&guard)
    }

    /// Provides write access to the state
    pub(crate) fn write<R>(
        &self,
        f: impl FnOnce(&mut WhitelistState) -> R,
    ) -> R {
        let mut guard = self.inner.write();
        f(&mut guard)
    }
}

/// The bucket keys this cache mirrors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TrackedKey {
    Enabled,
    Whitelisted,
}

impl TrackedKey {
    pub(crate) fn from_key(key: &str) -> Option<Self> {
        match key {
            KEY_ENABLED => Some(TrackedKey::Enabled),
            KEY_WHITELISTED => Some(TrackedKey::Whitelisted),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TrackedKey::Enabled => KEY_ENABLED,
            TrackedKey::Whitelisted => KEY_WHITELISTED,
        }
    }
}

/// Newest store revision reflected locally, per key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Revisions {
    enabled: u64,
    whitelisted: u64,
}

impl Revisions {
    pub(crate) fn get(
        &self,
        key: TrackedKey,
    ) -> u64 {
        match key {
            TrackedKey::Enabled => self.enabled,
            TrackedKey::Whitelisted => self.whitelisted,
        }
    }

    /// Records `revision` unless a newer one is already known
    pub(crate) fn observe(
        &mut self,
        key: TrackedKey,
        revision: u64,
    ) {
        let slot = match key {
            TrackedKey::Enabled => &mut self.enabled,
            TrackedKey::Whitelisted => &mut self.whitelisted,
        };
        *slot = (*slot).max(revision);
    }

    /// An event is stale when the local copy already reflects it or something newer.
    /// Revision 0 is never stale.
    pub(crate) fn is_stale(
        &self,
        key: TrackedKey,
        revision: u64,
    ) -> bool {
        revision != 0 && revision <= self.get(key)
    }
}
