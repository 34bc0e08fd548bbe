//! The raw tier's eviction engine.
//!
//! A classic CLOCK sweep: walk the raw pool starting at `clock_hand`, halving
//! any nonzero popularity counter as it passes over a buffer, until it finds
//! one already at zero. That buffer is compressed into a new buffer (same
//! `id`) and migrated into the comp tier; the raw original is victimized and
//! dropped.

use std::sync::Arc;

use tracing::debug;

use crate::buffer::{Buffer, MAX_POPULARITY};
use crate::error::{self, Result};
use crate::list::gate::WriteGuard;
use crate::list::{insert_sorted, remove_sorted, ListData, Tier};
use crate::lock_pool::LockPool;
use crate::tier_pair::TierPair;

/// Scans `raw` for the next zero-popularity buffer, halving popularity on
/// every buffer it passes over, and returns its pool index. Advances
/// `raw.clock_hand` to the id of the buffer just past the chosen victim.
///
/// An empty raw pool here means the caller's memory budget cannot be met by
/// any amount of sweeping; that is a fatal precondition violation, not a
/// recoverable error.
fn select_victim(raw: &mut ListData, lock_pool: &LockPool) -> usize {
    let len = raw.pool.len();
    if len == 0 {
        error::fatal("raw tier sweep cannot proceed: pool is empty and the budget is unattainable");
    }
    let start = match raw.clock_hand {
        Some(id) => raw.pool.partition_point(|b| b.id < id) % len,
        None => 0,
    };
    let mut idx = start;
    loop {
        let buf = raw.pool[idx].clone();
        let mut guard = buf.lock(lock_pool);
        if guard.popularity == 0 {
            drop(guard);
            raw.clock_hand = if len > 1 {
                Some(raw.pool[(idx + 1) % len].id)
            } else {
                None
            };
            return idx;
        }
        guard.popularity /= 2;
        drop(guard);
        idx = (idx + 1) % len;
    }
}

/// Frees at least `bytes_needed` from the raw tier, migrating each victim
/// into the comp tier. Returns the total bytes actually freed from the raw
/// tier -- the victim's raw-tier accounted size, not whatever the
/// compression pass happens to save.
pub(crate) fn sweep_locked<'a>(
    pair: &'a TierPair,
    wg: &mut WriteGuard<'a>,
    bytes_needed: u64,
) -> Result<u64> {
    let mut freed = 0u64;
    let goal_floor = {
        let raw = pair.list_mut(wg, Tier::Raw);
        (raw.current_size * raw.sweep_goal_pct as u64 / 100).max(bytes_needed)
    };

    while freed < goal_floor {
        let raw = pair.list_mut(wg, Tier::Raw);
        let idx = select_victim(raw, &pair.lock_pool);
        let victim = raw.pool[idx].clone();

        let compressed = compress_victim(pair, &victim)?;

        let raw = pair.list_mut(wg, Tier::Raw);
        let victim_size = victim.lock(&pair.lock_pool).victimize().accounted_size() as u64;
        remove_sorted(raw, victim.id)?;
        raw.current_size = raw.current_size.saturating_sub(victim_size);
        raw.sweeps_run += 1;
        freed += victim_size;

        migrate_into_comp(pair, wg, compressed)?;
    }
    debug!(bytes_needed, freed, "sweep complete");
    Ok(freed)
}

/// Builds a compressed copy of `victim` under its own lock, without touching
/// the original's `ref_count` or `victimized` state.
fn compress_victim(pair: &TierPair, victim: &Arc<Buffer>) -> Result<Buffer> {
    let guard = victim.lock(&pair.lock_pool);
    let copy = Buffer::copy_from_locked(victim.id, &pair.lock_pool, &guard, true);
    drop(guard);
    let mut copy_guard = copy.lock(&pair.lock_pool);
    copy_guard.compress(pair.codec.as_ref())?;
    drop(copy_guard);
    Ok(copy)
}

/// Inserts `compressed` into the comp tier, popping first if it has no room.
///
/// Everything already resident in the comp tier ages one generation (its
/// popularity drops by one, saturating at zero) before the new arrival is
/// stamped `MAX_POPULARITY`. That stamp-and-decay pair is the only source of
/// ordering the generational pop in `pop.rs` has to work with -- without it
/// every buffer's popularity sits at zero and pop degenerates to plain
/// insertion-order eviction.
fn migrate_into_comp<'a>(pair: &'a TierPair, wg: &mut WriteGuard<'a>, compressed: Buffer) -> Result<()> {
    let needed = compressed.lock(&pair.lock_pool).accounted_size() as u64;
    let comp = pair.list_mut(wg, Tier::Comp);
    if comp.current_size + needed > comp.max_size {
        let overflow = comp.current_size + needed - comp.max_size;
        super::pop::pop_locked(pair, wg, overflow)?;
    }
    let comp = pair.list_mut(wg, Tier::Comp);
    for buf in &comp.pool {
        let mut guard = buf.lock(&pair.lock_pool);
        guard.popularity = guard.popularity.saturating_sub(1);
    }
    compressed.lock(&pair.lock_pool).popularity = MAX_POPULARITY;
    insert_sorted(comp, Arc::new(compressed))?;
    comp.current_size += needed;
    Ok(())
}
