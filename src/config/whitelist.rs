use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_NAMESPACE_SUFFIX;
use crate::constants::DEFAULT_WATCH_BUFFER_SIZE;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WhitelistConfig {
    /// Appended to the network key to name the bucket
    #[serde(default = "default_namespace_suffix")]
    pub namespace_suffix: String,

    /// Capacity of the change feed between the store and the apply loop
    #[serde(default = "default_watch_buffer_size")]
    pub watch_buffer_size: usize,

    /// Perform one synchronous reload right after construction
    #[serde(default = "default_reload_on_start")]
    pub reload_on_start: bool,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            namespace_suffix: default_namespace_suffix(),
            watch_buffer_size: default_watch_buffer_size(),
            reload_on_start: default_reload_on_start(),
        }
    }
}

impl WhitelistConfig {
    /// Validates whitelist configuration
    /// # Errors
    /// Returns `Error::InvalidConfig` when:
    /// - the namespace suffix is empty
    /// - the watch buffer has no capacity
    pub fn validate(&self) -> Result<()> {
        if self.namespace_suffix.is_empty() {
            return Err(Error::InvalidConfig("namespace_suffix cannot be empty".into()));
        }

        if self.watch_buffer_size == 0 {
            return Err(Error::InvalidConfig("watch_buffer_size must be greater than 0".into()));
        }

        Ok(())
    }

    /// Bucket namespace owned by `network_key`'s whitelist
    pub fn namespace_for(
        &self,
        network_key: &str,
    ) -> String {
        format!("{}{}", network_key, self.namespace_suffix)
    }
}

fn default_namespace_suffix() -> String {
    DEFAULT_NAMESPACE_SUFFIX.to_string()
}

fn default_watch_buffer_size() -> usize {
    DEFAULT_WATCH_BUFFER_SIZE
}

fn default_reload_on_start() -> bool {
    false
}
