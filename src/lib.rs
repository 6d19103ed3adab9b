//! Consistency-aware whitelist cache backed by a watched key-value bucket.
//!
//! The authoritative whitelist (an `enabled` flag and a list of member ids)
//! lives in a namespaced bucket of an external key-value store. Every process
//! keeps a [`Whitelist`] cache that:
//! - subscribes to the bucket's change feed and applies remote updates in the
//!   background,
//! - answers reads from memory,
//! - writes local mutations through to the bucket.
//!
//! # Basic Usage
//! ```rust,ignore
//! use kv_whitelist::{MemoryKv, Whitelist, WhitelistConfig};
//!
//! let store = MemoryKv::new();
//! let whitelist = Whitelist::for_network(&store, "lobby", &WhitelistConfig::default()).await?;
//!
//! whitelist.enable().await?;
//! whitelist.add("069a79f4-44e9-4726-a5be-fca90e38aaf5").await?;
//!
//! if whitelist.is_enabled() && !whitelist.contains(player_id) {
//!     // reject the connection
//! }
//!
//! whitelist.shutdown().await?;
//! ```

mod config;
mod constants;
mod errors;
mod kv;
pub mod metrics;
mod whitelist;

pub use config::*;
pub use constants::KEY_ENABLED;
pub use constants::KEY_WHITELISTED;
pub use errors::*;
pub use kv::*;
pub use whitelist::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
