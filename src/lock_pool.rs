//! The per-buffer lock pool.
//!
//! A fixed-size array of mutex+condvar pairs shared by buffers by id. Buffer
//! creation/destruction never creates or destroys an OS sync primitive; it just
//! hands out a `lock_id` round-robin from a process-wide counter. Sharing
//! introduces benign contention between buffers that happen to land on the same
//! slot, which is the point: the pool trades a little contention for a fixed,
//! predictable memory footprint.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex};

/// One slot: a raw mutex+condvar pair with no data of its own. The data it
/// guards (a `Buffer`'s mutable fields) lives elsewhere and is accessed only
/// while the slot's mutex is held -- see `buffer::GatedCell`.
struct LockSlot {
    mutex: Mutex<()>,
    condvar: Condvar,
}

/// Fixed-size pool of lock slots, sized at startup from `CacheConfig::max_locks`.
pub struct LockPool {
    slots: Vec<LockSlot>,
    next_id: AtomicU32,
}

impl LockPool {
    /// Creates a pool with `size` slots. Lock id `0` is reserved and never
    /// handed out by `assign_next_id`; slot 0 still exists so indices stay
    /// dense.
    pub fn new(size: u16) -> Self {
        assert!(size > 0, "lock pool size must be nonzero");
        let slots = (0..size)
            .map(|_| LockSlot {
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            })
            .collect();
        Self {
            slots,
            next_id: AtomicU32::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Hands out the next lock id, round-robin, skipping 0 unless the pool has
    /// exactly one slot.
    pub fn assign_next_id(&self) -> u32 {
        if self.slots.len() == 1 {
            return 0;
        }
        loop {
            let prev = self.next_id.fetch_add(1, Ordering::Relaxed);
            let candidate = (prev + 1) % self.slots.len() as u32;
            if candidate != 0 {
                return candidate;
            }
        }
    }

    pub fn lock(&self, lock_id: u32) -> parking_lot::MutexGuard<'_, ()> {
        self.slots[lock_id as usize].mutex.lock()
    }

    pub fn wait(&self, lock_id: u32, guard: &mut parking_lot::MutexGuard<'_, ()>) {
        self.slots[lock_id as usize].condvar.wait(guard);
    }

    pub fn notify_all(&self, lock_id: u32) {
        self.slots[lock_id as usize].condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_assigns_lock_id_zero_with_multiple_slots() {
        let pool = LockPool::new(4);
        for _ in 0..20 {
            assert_ne!(pool.assign_next_id(), 0);
        }
    }

    #[test]
    fn wraps_around() {
        let pool = LockPool::new(2);
        let ids: Vec<_> = (0..5).map(|_| pool.assign_next_id()).collect();
        assert!(ids.iter().all(|&id| id == 1));
    }
}
