//! The two list tiers and the operations that move buffers between them.
//!
//! A [`TierPair`] owns both the raw (uncompressed) and comp (compressed)
//! tiers behind one [`gate::Gate`]. A C implementation of this cache tends to
//! wire the tiers together with cyclic `offload_to`/`restore_to` raw
//! pointers between two separately-locked lists; here both tiers live as
//! array slots in one object, selected by [`Tier`], so there is no cycle to
//! build.

pub mod gate;
pub mod pop;
pub mod sweep;

use std::sync::Arc;

use crate::buffer::{Buffer, BufferId};
use crate::error::{AccrsError, Result};

pub use gate::{Gate, ReadPin, WriteGuard};

/// Selects which of a `TierPair`'s two lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Raw,
    Comp,
}

/// The mutable contents of one tier. Every field here is read-only to the
/// outside world except through `TierPair`'s `_locked` helpers, which require
/// proof of exclusivity (a `&mut WriteGuard`) or, for reads, an active
/// `ReadPin`.
#[derive(Default)]
pub struct ListData {
    /// Sorted ascending by `Buffer::id`; binary-searchable.
    pub pool: Vec<Arc<Buffer>>,
    pub current_size: u64,
    pub max_size: u64,
    /// Id of the next buffer the clock sweep should examine. Tracked by id
    /// rather than pool index: `insert`/`remove` shift every index past the
    /// change, so a raw index would silently start scanning the wrong buffer
    /// after the very first eviction.
    pub clock_hand: Option<BufferId>,
    /// Target percentage of `max_size` to free per sweep.
    pub sweep_goal_pct: u8,
    /// Monotonically increasing popularity floor used by the comp tier's
    /// generational pop; buffers at or below this threshold are eligible for
    /// eviction.
    pub pop_threshold: u8,
    pub sweeps_run: u64,
    pub pops_run: u64,
    pub restores_run: u64,
}

impl ListData {
    fn find(&self, id: BufferId) -> Option<usize> {
        self.pool.binary_search_by_key(&id, |b| b.id).ok()
    }
}

/// Inserts `buf` into `data.pool`, keeping ascending order by id.
pub(crate) fn insert_sorted(data: &mut ListData, buf: Arc<Buffer>) -> Result<()> {
    match data.pool.binary_search_by_key(&buf.id, |b| b.id) {
        Ok(_) => Err(AccrsError::BufferAlreadyExists),
        Err(pos) => {
            data.pool.insert(pos, buf);
            Ok(())
        }
    }
}

/// Removes and returns the buffer with `id`.
pub(crate) fn remove_sorted(data: &mut ListData, id: BufferId) -> Result<Arc<Buffer>> {
    match data.find(id) {
        Some(pos) => Ok(data.pool.remove(pos)),
        None => Err(AccrsError::BufferNotFound),
    }
}

/// Looks up `id` without removing it.
pub(crate) fn find_sorted(data: &ListData, id: BufferId) -> Option<Arc<Buffer>> {
    data.find(id).map(|pos| data.pool[pos].clone())
}
