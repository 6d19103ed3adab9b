//! Configuration management for the whitelist cache.
//!
//! Sources are merged with increasing priority:
//! 1. Default values (hardcoded)
//! 2. Config file passed to [`Settings::load`]
//! 3. File named by the `WHITELIST_CONFIG_PATH` environment variable
//! 4. Environment variables prefixed with `WHITELIST__`, e.g.
//!    `WHITELIST__WHITELIST__WATCH_BUFFER_SIZE=128`
//!

mod storage;
mod whitelist;
pub use storage::*;
pub use whitelist::*;


//---
use std::env;
use std::sync::Arc;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::BucketProvider;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Cache behaviour and bucket naming
    #[serde(default)]
    pub whitelist: WhitelistConfig,
    /// Which bucket store backs the cache
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Settings {
    /// Load configuration from multiple sources with priority:
    /// 1. `config_path`, if given
    /// 2. `WHITELIST_CONFIG_PATH`
    /// 3. Environment variables
    ///
    /// The merged result is validated before it is returned.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        if let Some(path) = config_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        if let Ok(path) = env::var("WHITELIST_CONFIG_PATH") {
            config = config.add_source(File::with_name(&path));
        }

        config = config.add_source(
            Environment::with_prefix("WHITELIST")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.whitelist.validate()?;
        self.storage.validate()?;
        Ok(())
    }

    /// Opens the bucket provider selected by [`StorageConfig::backend`]
    pub fn open_provider(&self) -> Result<Arc<dyn BucketProvider>> {
        self.storage.open_provider(self.whitelist.watch_buffer_size)
    }
}
