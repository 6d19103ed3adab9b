//! Synchronized whitelist cache
//!
//! [`Whitelist`] mirrors two keys of one bucket:
//! - `enabled`: JSON boolean
//! - `whitelisted`: JSON array of identifiers
//!
//! ```text
//!   callers ──read──▶ StateGuard (RwLock)  ◀──apply── ApplyLoop ◀── Watcher
//!      │                    ▲                            │
//!      └──mutate────────────┘                            │
//!      │                                                 │
//!      └──persist──▶ KvBucket ──change feed──────────────┘
//! ```
//!
//! Writes made through the cache come back through the change feed like
//! everyone else's. The apply loop compares each event's revision with the
//! newest one already reflected locally and skips it if it is not newer, so an
//! old echo never rolls back a later local mutation.

mod apply_loop;
mod cache;
mod state;

pub use apply_loop::ApplyOutcome;
pub use cache::*;
pub use state::WhitelistState;
