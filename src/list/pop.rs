//! The comp tier's eviction engine.
//!
//! A generational FIFO: buffers are scanned oldest-first (ascending id) for
//! one at or below the current `pop_threshold`. If none qualifies, the
//! threshold is raised and the scan repeats, so popularity still matters but
//! a pathologically popular comp tier cannot starve eviction forever. Popped
//! buffers are discarded outright -- there is no tier below comp to migrate
//! into.

use crate::buffer::{BufferId, MAX_POPULARITY};
use crate::error::{self, Result};
use crate::list::gate::WriteGuard;
use crate::list::{remove_sorted, ListData, Tier};
use crate::lock_pool::LockPool;
use crate::tier_pair::TierPair;

/// Finds the id of the oldest buffer at or below `comp.pop_threshold`,
/// raising the threshold and rescanning if none qualifies.
///
/// An empty comp pool here means the caller's memory budget cannot be met by
/// any amount of popping; that is a fatal precondition violation, not a
/// recoverable error.
fn select_victim(comp: &mut ListData, lock_pool: &LockPool) -> BufferId {
    if comp.pool.is_empty() {
        error::fatal("comp tier pop cannot proceed: pool is empty and the budget is unattainable");
    }
    loop {
        for buf in &comp.pool {
            let guard = buf.lock(lock_pool);
            if guard.popularity <= comp.pop_threshold {
                return buf.id;
            }
        }
        if comp.pop_threshold >= MAX_POPULARITY {
            return comp.pool[0].id;
        }
        comp.pop_threshold += 1;
    }
}

/// Frees at least `bytes_needed` from the comp tier. Returns the bytes
/// actually freed.
pub(crate) fn pop_locked<'a>(
    pair: &'a TierPair,
    wg: &mut WriteGuard<'a>,
    bytes_needed: u64,
) -> Result<u64> {
    let mut freed = 0u64;
    while freed < bytes_needed {
        let comp = pair.list_mut(wg, Tier::Comp);
        let victim_id = select_victim(comp, &pair.lock_pool);
        let victim = comp
            .pool
            .iter()
            .find(|b| b.id == victim_id)
            .cloned()
            .expect("select_victim returned an id not present in the pool it scanned");

        let size = victim.lock(&pair.lock_pool).victimize().accounted_size() as u64;

        let comp = pair.list_mut(wg, Tier::Comp);
        remove_sorted(comp, victim_id)?;
        comp.current_size = comp.current_size.saturating_sub(size);
        comp.pops_run += 1;
        freed += size;
    }
    Ok(freed)
}
