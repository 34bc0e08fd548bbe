//! The cached page and its per-buffer operations.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::time::Instant;

use crate::codec::Codec;
use crate::error::{AccrsError, Result};
use crate::lock_pool::LockPool;
use crate::source::PageSource;

/// Ceiling for `popularity`: a saturating counter, never wraps past this.
pub const MAX_POPULARITY: u8 = u8::MAX;

/// Fixed per-buffer bookkeeping cost added to payload size when accounting
/// against a list's `max_size`.
pub const BUFFER_OVERHEAD: u32 = 64;

pub type BufferId = u32;

/// A cell whose contents may only be touched while the caller holds the lock
/// pool slot identified by the owning `Buffer`'s `lock_id`. Buffer state
/// lives outside the mutex object itself: many buffers can share one
/// `LockSlot`, so the protected data cannot be embedded in a per-buffer
/// `Mutex<T>`. Every access goes through `BufferGuard`, which is the only
/// thing that can construct a reference into the cell.
struct GatedCell<T> {
    cell: UnsafeCell<T>,
}

// SAFETY: `GatedCell<T>` is only ever read or written while the owning
// buffer's lock pool slot is held (enforced by `BufferGuard`), so concurrent
// access is externally serialized exactly like a `Mutex<T>` would provide.
unsafe impl<T: Send> Send for GatedCell<T> {}
unsafe impl<T: Send> Sync for GatedCell<T> {}

impl<T> GatedCell<T> {
    fn new(value: T) -> Self {
        Self {
            cell: UnsafeCell::new(value),
        }
    }

    fn get(&self) -> *mut T {
        self.cell.get()
    }
}

/// Mutable state of a `Buffer`, protected by its `lock_id` slot in the
/// `LockPool`.
pub struct BufferInner {
    pub data: Vec<u8>,
    pub data_length: u32,
    pub comp_length: u32,
    pub ref_count: u32,
    pub popularity: u8,
    pub victimized: bool,
    /// One-shot copy-on-write marker for `list_update`: set by the first
    /// concurrent updater, cleared by that same updater once it installs the
    /// new payload.
    pub dirty: bool,
    pub comp_cost_ns: u64,
    pub io_cost_ns: u64,
    pub comp_hits: u32,
}

/// One cached page. `id` and `lock_id` are immutable for the buffer's
/// lifetime; everything else lives behind the lock pool slot named by
/// `lock_id`.
pub struct Buffer {
    pub id: BufferId,
    pub lock_id: u32,
    inner: GatedCell<BufferInner>,
}

/// Where `Buffer::initialize` gets its payload from.
pub enum BufferSource<'a> {
    Disk {
        source: &'a dyn PageSource,
        filespec: &'a Path,
    },
    Bytes(Vec<u8>),
    Empty,
}

impl Buffer {
    /// Allocates a buffer, assigns a `lock_id`, zeroes counters, and (for a
    /// disk source) reads and times the page read into `io_cost_ns`.
    pub fn initialize(id: BufferId, pool: &LockPool, source: BufferSource<'_>) -> Result<Self> {
        let lock_id = pool.assign_next_id();
        let (data, io_cost_ns) = match source {
            BufferSource::Empty => (Vec::new(), 0),
            BufferSource::Bytes(bytes) => (bytes, 0),
            BufferSource::Disk { source, filespec } => {
                let start = Instant::now();
                let bytes = source.read(filespec)?;
                (bytes, start.elapsed().as_nanos() as u64)
            }
        };
        let data_length = data.len() as u32;
        Ok(Self {
            id,
            lock_id,
            inner: GatedCell::new(BufferInner {
                data,
                data_length,
                comp_length: 0,
                ref_count: 0,
                popularity: 0,
                victimized: false,
                dirty: false,
                comp_cost_ns: 0,
                io_cost_ns,
                comp_hits: 0,
            }),
        })
    }

    /// `buffer__copy`: shallow field copy into a fresh buffer with its own
    /// `lock_id`; when `copy_data` is true the payload is cloned too.
    pub fn copy_from(&self, new_id: BufferId, pool: &LockPool, copy_data: bool) -> Result<Self> {
        let guard = self.lock(pool);
        Ok(Self::copy_fields(new_id, pool, &guard, copy_data))
    }

    /// Same as `copy_from`, but for a caller that already holds `src`'s guard
    /// (e.g. mid-victimize during a sweep) and would deadlock re-locking it.
    pub(crate) fn copy_from_locked(
        new_id: BufferId,
        pool: &LockPool,
        src: &BufferInner,
        copy_data: bool,
    ) -> Self {
        Self::copy_fields(new_id, pool, src, copy_data)
    }

    fn copy_fields(new_id: BufferId, pool: &LockPool, src: &BufferInner, copy_data: bool) -> Self {
        let data = if copy_data { src.data.clone() } else { Vec::new() };
        let data_length = src.data_length;
        let comp_length = src.comp_length;
        let popularity = src.popularity;
        let lock_id = pool.assign_next_id();
        Self {
            id: new_id,
            lock_id,
            inner: GatedCell::new(BufferInner {
                data,
                data_length,
                comp_length,
                ref_count: 0,
                popularity,
                victimized: false,
                dirty: false,
                comp_cost_ns: 0,
                io_cost_ns: 0,
                comp_hits: 0,
            }),
        }
    }

    /// Locks this buffer's slot in `pool`. Always returns a usable guard;
    /// `guard.victimized` tells the caller whether it arrived too late. A
    /// buffer pointer going stale out from under a racing reader (freed by
    /// another thread) cannot arise here: every live reference to a `Buffer`
    /// is an `Arc<Buffer>` clone, so the buffer stays allocated for as long
    /// as anyone holds one, regardless of list membership.
    pub fn lock<'a>(&'a self, pool: &'a LockPool) -> BufferGuard<'a> {
        let mutex_guard = pool.lock(self.lock_id);
        BufferGuard {
            buffer: self,
            pool,
            _mutex_guard: mutex_guard,
        }
    }
}

/// RAII guard granting access to a `Buffer`'s protected state while holding
/// its lock pool slot.
pub struct BufferGuard<'a> {
    buffer: &'a Buffer,
    pool: &'a LockPool,
    _mutex_guard: parking_lot::MutexGuard<'a, ()>,
}

impl<'a> Deref for BufferGuard<'a> {
    type Target = BufferInner;
    fn deref(&self) -> &BufferInner {
        // SAFETY: holding `_mutex_guard` for this buffer's lock_id.
        unsafe { &*self.buffer.inner.get() }
    }
}

impl<'a> DerefMut for BufferGuard<'a> {
    fn deref_mut(&mut self) -> &mut BufferInner {
        // SAFETY: holding `_mutex_guard` for this buffer's lock_id.
        unsafe { &mut *self.buffer.inner.get() }
    }
}

impl<'a> BufferGuard<'a> {
    /// `buffer__update_ref`: must be called under the buffer's lock (which
    /// this type statically guarantees). Increment is refused once
    /// victimized; decrement always succeeds and wakes a waiting victimizer
    /// once it drains the buffer to zero.
    pub fn update_ref(&mut self, delta: i32) -> Result<()> {
        if delta > 0 && self.victimized {
            return Err(AccrsError::BufferIsVictimized);
        }
        self.ref_count = (self.ref_count as i64 + delta as i64).max(0) as u32;
        if self.victimized && self.ref_count == 0 {
            self.pool.notify_all(self.buffer.lock_id);
        }
        Ok(())
    }

    /// `buffer__victimize`: sets the one-shot flag and blocks until
    /// `ref_count` drains to zero. On return the buffer remains locked and is
    /// guaranteed unreachable by new pins.
    pub fn victimize(mut self) -> Self {
        self.victimized = true;
        while self.ref_count != 0 {
            self.pool.wait(self.buffer.lock_id, &mut self._mutex_guard);
        }
        self
    }

    /// `buffer__compress`: compresses `data` in place, leaving `data_length`
    /// untouched so a later `decompress` knows how much to allocate.
    pub fn compress(&mut self, codec: &dyn Codec) -> Result<()> {
        if self.data.is_empty() || self.data_length == 0 {
            return Err(AccrsError::BufferMissingData);
        }
        if self.comp_length != 0 {
            return Err(AccrsError::BufferAlreadyCompressed);
        }
        let start = Instant::now();
        let compressed = codec.compress(&self.data)?;
        self.comp_length = compressed.len() as u32;
        self.data = compressed;
        self.comp_cost_ns += start.elapsed().as_nanos() as u64;
        Ok(())
    }

    /// `buffer__decompress`: inverse of `compress`; allocates `data_length`
    /// bytes and clears `comp_length`.
    pub fn decompress(&mut self, codec: &dyn Codec) -> Result<()> {
        if self.data.is_empty() {
            return Err(AccrsError::BufferMissingData);
        }
        if self.comp_length == 0 {
            return Err(AccrsError::BufferAlreadyDecompressed);
        }
        let start = Instant::now();
        let restored = codec.decompress(&self.data, self.data_length as usize)?;
        self.data = restored;
        self.comp_length = 0;
        self.comp_cost_ns += start.elapsed().as_nanos() as u64;
        Ok(())
    }

    /// Byte size this buffer contributes to a list's `current_size`.
    pub fn accounted_size(&self) -> u32 {
        BUFFER_OVERHEAD
            + if self.comp_length == 0 {
                self.data_length
            } else {
                self.comp_length
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Lz4Codec, NoneCodec};

    fn seeded(pool: &LockPool, id: BufferId, bytes: &[u8]) -> Buffer {
        Buffer::initialize(id, pool, BufferSource::Bytes(bytes.to_vec())).unwrap()
    }

    #[test]
    fn lock_ids_are_never_zero_and_ref_counting_works() {
        let pool = LockPool::new(8);
        let buf = seeded(&pool, 1, b"hello world");
        assert_ne!(buf.lock_id, 0);

        let mut guard = buf.lock(&pool);
        assert_eq!(guard.ref_count, 0);
        guard.update_ref(1).unwrap();
        assert_eq!(guard.ref_count, 1);
        guard.update_ref(-1).unwrap();
        assert_eq!(guard.ref_count, 0);
    }

    #[test]
    fn increment_after_victimize_is_refused() {
        let pool = LockPool::new(8);
        let buf = seeded(&pool, 1, b"hello world");
        let guard = buf.lock(&pool).victimize();
        let mut guard = guard;
        assert_eq!(guard.update_ref(1), Err(AccrsError::BufferIsVictimized));
    }

    #[test]
    fn compress_then_decompress_round_trips() {
        let pool = LockPool::new(4);
        let original = b"the quick brown fox jumps over the lazy dog".to_vec();
        let buf = seeded(&pool, 7, &original);
        let mut guard = buf.lock(&pool);
        guard.compress(&Lz4Codec).unwrap();
        assert!(guard.comp_length > 0);
        assert_eq!(guard.data_length as usize, original.len());
        guard.decompress(&Lz4Codec).unwrap();
        assert_eq!(guard.comp_length, 0);
        assert_eq!(guard.data, original);
    }

    #[test]
    fn compress_on_empty_data_is_missing_data() {
        let pool = LockPool::new(4);
        let buf = Buffer::initialize(1, &pool, BufferSource::Empty).unwrap();
        let mut guard = buf.lock(&pool);
        assert_eq!(
            guard.compress(&NoneCodec),
            Err(AccrsError::BufferMissingData)
        );
    }

    #[test]
    fn copy_from_clones_data_when_requested() {
        let pool = LockPool::new(4);
        let buf = seeded(&pool, 1, b"payload");
        let copy = buf.copy_from(2, &pool, true).unwrap();
        let guard = copy.lock(&pool);
        assert_eq!(guard.data, b"payload");
    }
}
