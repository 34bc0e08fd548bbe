//! Ties the raw and comp tiers together behind one gate.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::buffer::{Buffer, BufferId, BufferSource};
use crate::codec::{codec_for, Codec};
use crate::config::CacheConfig;
use crate::error::{AccrsError, Result};
use crate::list::{self, find_sorted, insert_sorted, remove_sorted, Gate, ListData, ReadPin, Tier, WriteGuard};
use crate::list::{pop, sweep};
use crate::lock_pool::LockPool;
use crate::source::PageSource;

struct ListCell(UnsafeCell<ListData>);

// SAFETY: contents are only read through a live `ReadPin` and only mutated
// through a live `WriteGuard`, both issued by `TierPair::gate` -- see
// `list::gate` for why that serializes access the same way a `Mutex` would.
unsafe impl Send for ListCell {}
unsafe impl Sync for ListCell {}

impl ListCell {
    fn new(data: ListData) -> Self {
        Self(UnsafeCell::new(data))
    }

    fn get(&self) -> *mut ListData {
        self.0.get()
    }
}

/// Point-in-time counters surfaced to callers and to the diagnostics layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub raw_count: usize,
    pub raw_bytes: u64,
    pub comp_count: usize,
    pub comp_bytes: u64,
    pub sweeps_run: u64,
    pub pops_run: u64,
    pub restores_run: u64,
}

/// Owns both tiers and the single gate that governs cross-tier migration.
/// Holding both lists behind one gate (instead of each tier owning its own
/// lock and holding a back-reference to the other) sidesteps the cyclic
/// `offload_to`/`restore_to` wiring the raw and comp tiers would otherwise
/// need.
pub struct TierPair {
    gate: Gate,
    raw: ListCell,
    comp: ListCell,
    pub(crate) lock_pool: LockPool,
    pub(crate) codec: Box<dyn Codec>,
    next_buffer_id: AtomicU32,
    total_memory: u64,
    stats: Mutex<CacheStats>,
}

impl TierPair {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let raw_max = config.total_memory * config.raw_ratio as u64 / 100;
        let comp_max = config.total_memory.saturating_sub(raw_max);
        Ok(Self {
            gate: Gate::new(),
            raw: ListCell::new(ListData {
                max_size: raw_max,
                sweep_goal_pct: config.sweep_goal_pct,
                ..ListData::default()
            }),
            comp: ListCell::new(ListData {
                max_size: comp_max,
                ..ListData::default()
            }),
            lock_pool: LockPool::new(config.max_locks),
            codec: codec_for(config.compressor)?,
            next_buffer_id: AtomicU32::new(1),
            total_memory: config.total_memory,
            stats: Mutex::new(CacheStats::default()),
        })
    }

    pub fn next_buffer_id(&self) -> BufferId {
        self.next_buffer_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The lock pool backing every buffer this pair owns. Callers building
    /// buffers outside of `load`/`add` (e.g. a synthetic workload generator)
    /// need this to call `Buffer::initialize`.
    pub fn lock_pool(&self) -> &LockPool {
        &self.lock_pool
    }

    pub(crate) fn write(&self) -> WriteGuard<'_> {
        WriteGuard::acquire(&self.gate)
    }

    pub(crate) fn read_pin(&self) -> ReadPin<'_> {
        ReadPin::acquire(&self.gate)
    }

    fn cell(&self, tier: Tier) -> &ListCell {
        match tier {
            Tier::Raw => &self.raw,
            Tier::Comp => &self.comp,
        }
    }

    /// Read access to `tier`'s data, valid for as long as `_pin` is alive.
    pub(crate) fn list_ref<'a>(&'a self, _pin: &ReadPin<'a>, tier: Tier) -> &'a ListData {
        unsafe { &*self.cell(tier).get() }
    }

    /// Exclusive access to `tier`'s data, valid for as long as `_wg` is alive.
    pub(crate) fn list_mut<'a>(&'a self, _wg: &mut WriteGuard<'a>, tier: Tier) -> &'a mut ListData {
        unsafe { &mut *self.cell(tier).get() }
    }

    /// Loads a page through `source` and inserts it into the raw tier.
    #[instrument(skip(self, source))]
    pub fn load(&self, source: &dyn PageSource, filespec: &std::path::Path) -> Result<Arc<Buffer>> {
        let id = self.next_buffer_id();
        let buf = Buffer::initialize(
            id,
            &self.lock_pool,
            BufferSource::Disk { source, filespec },
        )?;
        let arc = Arc::new(buf);
        self.add(Tier::Raw, arc.clone())?;
        Ok(arc)
    }

    /// Inserts an already-built buffer into `tier`, sweeping or popping first
    /// if the tier lacks room.
    pub fn add(&self, tier: Tier, buf: Arc<Buffer>) -> Result<()> {
        let needed = buf.lock(&self.lock_pool).accounted_size() as u64;
        let mut wg = self.write();
        self.ensure_room(&mut wg, tier, needed)?;
        let data = self.list_mut(&mut wg, tier);
        insert_sorted(data, buf)?;
        data.current_size += needed;
        Ok(())
    }

    /// Frees at least `needed` bytes from `tier`, running the tier's eviction
    /// engine (sweep for raw, pop for comp) until there is room.
    fn ensure_room<'a>(&'a self, wg: &mut WriteGuard<'a>, tier: Tier, needed: u64) -> Result<()> {
        let (current, max) = {
            let data = self.list_mut(wg, tier);
            (data.current_size, data.max_size)
        };
        if current + needed <= max {
            return Ok(());
        }
        let overflow = current + needed - max;
        match tier {
            Tier::Raw => {
                self.sweep_for_overflow(wg, overflow)?;
            }
            Tier::Comp => {
                pop::pop_locked(self, wg, overflow)?;
            }
        }
        Ok(())
    }

    /// Runs a raw-tier sweep guaranteed to aim for at least `overflow` bytes,
    /// temporarily raising `sweep_goal_pct` if the configured goal would not
    /// reach that far, and always restoring it afterward.
    fn sweep_for_overflow<'a>(&'a self, wg: &mut WriteGuard<'a>, overflow: u64) -> Result<u64> {
        let original_pct = {
            let raw = self.list_mut(wg, Tier::Raw);
            let required = required_sweep_pct(overflow, raw.current_size);
            let original = raw.sweep_goal_pct;
            raw.sweep_goal_pct = raw.sweep_goal_pct.max(required);
            original
        };
        let result = sweep::sweep_locked(self, wg, overflow);
        let raw = self.list_mut(wg, Tier::Raw);
        raw.sweep_goal_pct = original_pct;
        result
    }

    /// Removes `id` from `tier` outright, blocking until any outstanding
    /// pins drain.
    pub fn remove(&self, tier: Tier, id: BufferId) -> Result<()> {
        let mut wg = self.write();
        remove_accounted(self, &mut wg, tier, id)?;
        Ok(())
    }

    /// Copy-on-write update of a pinned buffer's payload, under the tier's
    /// write lock. Fails with `BufferIsDirty` if another update on the same
    /// buffer is already in flight -- `dirty` is a one-shot marker set for
    /// the duration of the swap and cleared before this call returns.
    pub fn update(&self, tier: Tier, id: BufferId, new_bytes: Vec<u8>) -> Result<()> {
        let mut wg = self.write();
        let data = self.list_mut(&mut wg, tier);
        let target = find_sorted(data, id).ok_or(AccrsError::BufferNotFound)?;

        let mut guard = target.lock(&self.lock_pool);
        if guard.dirty {
            return Err(AccrsError::BufferIsDirty);
        }
        let old_size = guard.accounted_size() as u64;
        guard.dirty = true;
        guard.data = new_bytes;
        guard.data_length = guard.data.len() as u32;
        guard.comp_length = 0;
        let new_size = guard.accounted_size() as u64;
        guard.dirty = false;
        drop(guard);

        let data = self.list_mut(&mut wg, tier);
        data.current_size = (data.current_size + new_size).saturating_sub(old_size);
        Ok(())
    }

    /// Looks up `id`, checking the raw tier first and falling back to the
    /// comp tier with an automatic restore on a comp hit.
    #[instrument(skip(self))]
    pub fn search(&self, id: BufferId) -> Result<Arc<Buffer>> {
        {
            let pin = self.read_pin();
            if let Some(buf) = find_sorted(self.list_ref(&pin, Tier::Raw), id) {
                let mut guard = buf.lock(&self.lock_pool);
                guard.update_ref(1)?;
                guard.popularity = guard.popularity.saturating_add(1);
                drop(guard);
                return Ok(buf);
            }
        }

        let comp_hit = {
            let pin = self.read_pin();
            find_sorted(self.list_ref(&pin, Tier::Comp), id)
        };
        match comp_hit {
            Some(comp_buf) => {
                {
                    let mut guard = comp_buf.lock(&self.lock_pool);
                    guard.comp_hits += 1;
                }
                debug!(buffer_id = id, "comp tier hit, restoring");
                self.restore(&comp_buf)
            }
            None => Err(AccrsError::BufferNotFound),
        }
    }

    /// Decompresses `comp_buf` into a fresh raw buffer, inserts it into the
    /// raw tier pinned for the caller, and retires the compressed original.
    fn restore(&self, comp_buf: &Arc<Buffer>) -> Result<Arc<Buffer>> {
        let new_id = comp_buf.id;
        let new_buf = {
            let mut guard = comp_buf.lock(&self.lock_pool);
            let copy = Buffer::copy_from_locked(new_id, &self.lock_pool, &guard, true);
            let mut copy_guard = copy.lock(&self.lock_pool);
            copy_guard.decompress(self.codec.as_ref())?;
            copy_guard.update_ref(1)?;
            drop(copy_guard);
            guard.comp_hits += 1;
            copy
        };
        let arc = Arc::new(new_buf);

        let needed = arc.lock(&self.lock_pool).accounted_size() as u64;
        let mut wg = self.write();
        self.ensure_room(&mut wg, Tier::Raw, needed)?;
        {
            let data = self.list_mut(&mut wg, Tier::Raw);
            insert_sorted(data, arc.clone())?;
            data.current_size += needed;
            data.restores_run += 1;
        }
        remove_accounted(self, &mut wg, Tier::Comp, comp_buf.id)?;
        drop(wg);
        Ok(arc)
    }

    /// Changes the raw/comp memory split at runtime, shedding from whichever
    /// tier now exceeds its new budget.
    #[instrument(skip(self))]
    pub fn rebalance(&self, raw_ratio: u8) -> Result<()> {
        if raw_ratio == 0 || raw_ratio > 99 {
            return Err(AccrsError::BadArgs("raw_ratio must be in 1..=99".into()));
        }
        let new_raw_max = self.total_memory * raw_ratio as u64 / 100;
        let new_comp_max = self.total_memory.saturating_sub(new_raw_max);

        let mut wg = self.write();
        let raw_overflow = {
            let raw = self.list_mut(&mut wg, Tier::Raw);
            raw.max_size = new_raw_max;
            (raw.current_size > raw.max_size).then(|| raw.current_size - raw.max_size)
        };
        if let Some(overflow) = raw_overflow {
            self.sweep_for_overflow(&mut wg, overflow)?;
        }
        {
            let comp = self.list_mut(&mut wg, Tier::Comp);
            comp.max_size = new_comp_max;
            if comp.current_size > comp.max_size {
                let overflow = comp.current_size - comp.max_size;
                pop::pop_locked(self, &mut wg, overflow)?;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let snapshot = {
            let pin = self.read_pin();
            let raw = self.list_ref(&pin, Tier::Raw);
            let comp = self.list_ref(&pin, Tier::Comp);
            CacheStats {
                raw_count: raw.pool.len(),
                raw_bytes: raw.current_size,
                comp_count: comp.pool.len(),
                comp_bytes: comp.current_size,
                sweeps_run: raw.sweeps_run,
                pops_run: comp.pops_run,
                restores_run: raw.restores_run,
            }
        };
        *self.stats.lock() = snapshot;
        snapshot
    }

    /// Sums `ref_count` across every buffer in both tiers. Used by callers
    /// and tests to confirm all outstanding pins have been released.
    pub fn total_pins(&self) -> u64 {
        let pin = self.read_pin();
        let raw = self.list_ref(&pin, Tier::Raw);
        let comp = self.list_ref(&pin, Tier::Comp);
        raw.pool
            .iter()
            .chain(comp.pool.iter())
            .map(|b| b.lock(&self.lock_pool).ref_count as u64)
            .sum()
    }
}

/// `sweep_goal_pct` just high enough that a single sweep call can free
/// `overflow` bytes out of `current_size`, capped at 99 -- never lowers the
/// caller's already-configured goal, only raises it.
fn required_sweep_pct(overflow: u64, current_size: u64) -> u8 {
    if current_size == 0 {
        return 99;
    }
    let pct = (overflow.saturating_mul(100) + current_size - 1) / current_size;
    pct.min(99) as u8
}

/// Victimizes and removes `id` from `tier`, adjusting `current_size`.
/// Shared by `TierPair::remove`, `restore`, and the sweep/pop engines.
pub(crate) fn remove_accounted<'a>(
    pair: &'a TierPair,
    wg: &mut WriteGuard<'a>,
    tier: Tier,
    id: BufferId,
) -> Result<Arc<Buffer>> {
    let data = pair.list_mut(wg, tier);
    let target = list::find_sorted(data, id).ok_or(AccrsError::BufferNotFound)?;
    let size = target.lock(&pair.lock_pool).victimize().accounted_size() as u64;
    let data = pair.list_mut(wg, tier);
    let removed = remove_sorted(data, id)?;
    data.current_size = data.current_size.saturating_sub(size);
    Ok(removed)
}
