//! The list-level reader/writer gate.
//!
//! A writer-preference lock built from one mutex and two condvars. Unlike a
//! textbook rwlock, this gate also needs to stay *held* across the writer's
//! entire critical section (including any nested list mutation a sweep or
//! rebalance performs), because a `TierPair`'s raw and comp tiers share one
//! gate so cross-tier migration is atomic with respect to every reader of
//! either tier.
//!
//! A C implementation of this gate can make the writer side recursive (a
//! thread already holding the write lock re-enters `add`/`remove` without
//! deadlocking itself). Rust's `Mutex` types are not reentrant, and
//! re-deriving ownership-based reentrancy would mean tracking a `ThreadId`
//! and bypassing the type system's aliasing guarantees. This crate instead
//! separates the public (locking) and internal (non-locking) operation
//! variants: a single top-level call acquires a [`WriteGuard`], and internal
//! helpers that need to nest (sweep calling add/remove, rebalance calling
//! sweep/pop) take the already-held guard by reference instead of
//! re-acquiring it.

use parking_lot::{Condvar, Mutex, MutexGuard};

#[derive(Default)]
struct GateState {
    ref_count: u32,
    pending_writers: u32,
}

pub struct Gate {
    mutex: Mutex<GateState>,
    writer_condition: Condvar,
    reader_condition: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(GateState::default()),
            writer_condition: Condvar::new(),
            reader_condition: Condvar::new(),
        }
    }

    /// Reader acquire: while a writer is pending, wait; then register the pin.
    /// If this reader was forced to wait, it broadcasts on the way out so
    /// siblings admitted alongside it wake up too.
    fn acquire_read(&self) {
        let mut state = self.mutex.lock();
        let mut had_to_wait = false;
        while state.pending_writers > 0 {
            had_to_wait = true;
            self.reader_condition.wait(&mut state);
        }
        state.ref_count += 1;
        if had_to_wait {
            self.reader_condition.notify_all();
        }
    }

    /// Reader release: decrement the pin; wake a pending writer if this was
    /// the last reader.
    fn release_read(&self) {
        let mut state = self.mutex.lock();
        state.ref_count -= 1;
        if state.ref_count == 0 && state.pending_writers > 0 {
            self.writer_condition.notify_all();
        }
    }

    fn acquire_write(&self) -> MutexGuard<'_, GateState> {
        let mut state = self.mutex.lock();
        state.pending_writers += 1;
        while state.ref_count != 0 {
            self.writer_condition.wait(&mut state);
        }
        state.pending_writers -= 1;
        state
    }
}

/// A pinned read of the gate. Released when dropped.
pub struct ReadPin<'a> {
    gate: &'a Gate,
}

impl<'a> ReadPin<'a> {
    pub fn acquire(gate: &'a Gate) -> Self {
        gate.acquire_read();
        Self { gate }
    }
}

impl<'a> Drop for ReadPin<'a> {
    fn drop(&mut self) {
        self.gate.release_read();
    }
}

/// Exclusive access to the gate, held for the writer's entire critical
/// section. Construct with [`WriteGuard::acquire`]; nested list operations
/// that need the same exclusivity take `&mut WriteGuard` instead of calling
/// `acquire` again.
pub struct WriteGuard<'a> {
    gate: &'a Gate,
    state: Option<MutexGuard<'a, GateState>>,
}

impl<'a> WriteGuard<'a> {
    pub fn acquire(gate: &'a Gate) -> Self {
        let state = gate.acquire_write();
        Self {
            gate,
            state: Some(state),
        }
    }
}

impl<'a> Drop for WriteGuard<'a> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            let other_writers_pending = state.pending_writers;
            drop(state);
            if other_writers_pending > 0 {
                self.gate.writer_condition.notify_all();
            } else {
                self.gate.reader_condition.notify_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn readers_run_concurrently() {
        let gate = Arc::new(Gate::new());
        let a = ReadPin::acquire(&gate);
        let b = ReadPin::acquire(&gate);
        drop(a);
        drop(b);
    }

    #[test]
    fn writer_excludes_readers() {
        let gate = Arc::new(Gate::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let writer_gate = gate.clone();
        let writer_order = order.clone();
        let writer = thread::spawn(move || {
            let _wg = WriteGuard::acquire(&writer_gate);
            writer_order.lock().push("writer");
            thread::sleep(Duration::from_millis(20));
        });

        thread::sleep(Duration::from_millis(5));
        let _pin = ReadPin::acquire(&gate);
        order.lock().push("reader-after-writer-released");

        writer.join().unwrap();
        assert_eq!(*order.lock(), vec!["writer", "reader-after-writer-released"]);
    }
}
