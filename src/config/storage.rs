use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::BucketProvider;
use crate::Error;
use crate::MemoryKv;
use crate::Result;
use crate::SledKv;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local buckets, lost on exit
    #[default]
    Memory,
    /// Buckets persisted in a sled database
    Sled,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database directory, used by the sled backend only
    #[serde(default = "default_sled_path")]
    pub sled_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sled_path: default_sled_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StorageBackend::Sled && self.sled_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("sled_path is required by the sled backend".into()));
        }
        Ok(())
    }

    pub fn open_provider(
        &self,
        watch_buffer_size: usize,
    ) -> Result<Arc<dyn BucketProvider>> {
        let provider: Arc<dyn BucketProvider> = match self.backend {
            StorageBackend::Memory => {
                info!("Using in-memory bucket store");
                Arc::new(MemoryKv::with_watch_buffer_size(watch_buffer_size))
            }
            StorageBackend::Sled => {
                info!("Using sled bucket store at {:?}", self.sled_path);
                Arc::new(SledKv::open(&self.sled_path)?.with_watch_buffer_size(watch_buffer_size))
            }
        };
        Ok(provider)
    }
}

fn default_sled_path() -> PathBuf {
    PathBuf::from("./db/whitelist")
}
