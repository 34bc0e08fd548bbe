//! Adaptive Compressed-Cache Replacement Strategy: a two-tier raw/compressed
//! buffer cache with clock-sweep and generational-pop eviction, and a
//! writer-preference reader/writer gate guarding each tier pair.
//!
//! The crate is organized by the same seams the design splits on: a lock
//! pool and per-buffer pin protocol (`lock_pool`, `buffer`), the two list
//! tiers and their eviction engines (`list`, `tier_pair`), and the external
//! collaborators a deployment wires in (`source`, `codec`).

pub mod buffer;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod list;
pub mod lock_pool;
pub mod source;
pub mod tier_pair;

pub use buffer::{Buffer, BufferId};
pub use config::CacheConfig;
pub use error::{AccrsError, Result};
pub use list::Tier;
pub use tier_pair::{CacheStats, TierPair};

/// Crate version, surfaced for the demo harness's banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
