// -
// Bucket layout

/// Key holding the JSON-encoded enabled flag
pub const KEY_ENABLED: &str = "enabled";

/// Key holding the JSON-encoded array of whitelisted identifiers
pub const KEY_WHITELISTED: &str = "whitelisted";

/// Appended to the owning network key to form the bucket namespace
pub(crate) const DEFAULT_NAMESPACE_SUFFIX: &str = "_whitelist";

// -
// Watch

/// Per-watcher channel capacity
pub(crate) const DEFAULT_WATCH_BUFFER_SIZE: usize = 64;

/// Pause before the apply loop subscribes again after its feed was closed
pub(crate) const WATCH_RESUBSCRIBE_BACKOFF_MS: u64 = 20;

/// Interval at which the sled bridge checks whether its watcher was dropped
pub(crate) const SLED_WATCH_POLL_INTERVAL_MS: u64 = 100;
