//! Multi-threaded coverage: concurrent readers with no writer, and a chaos
//! mix of readers and removing writers running against the same tier pair.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rand::Rng;

use accrs::buffer::{Buffer, BufferSource};
use accrs::config::CacheConfig;
use accrs::error::AccrsError;
use accrs::{Tier, TierPair};

fn preload(count: u32) -> (TierPair, Vec<u32>) {
    let config = CacheConfig {
        total_memory: 64 * 1024 * 1024,
        raw_ratio: 95,
        ..CacheConfig::default()
    };
    let pair = TierPair::new(&config).unwrap();
    let mut ids = Vec::with_capacity(count as usize);
    for id in 1..=count {
        let buf = Buffer::initialize(id, pair.lock_pool(), BufferSource::Bytes(vec![0u8; 64])).unwrap();
        pair.add(Tier::Raw, Arc::new(buf)).unwrap();
        ids.push(id);
    }
    (pair, ids)
}

#[test]
fn concurrent_readers_no_writer() {
    let (pair, ids) = preload(1000);
    let ids = Arc::new(ids);

    std::thread::scope(|scope| {
        for _ in 0..16 {
            let pair = &pair;
            let ids = ids.clone();
            scope.spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..2000 {
                    let id = ids[rng.random_range(0..ids.len())];
                    match pair.search(id) {
                        Ok(buf) => {
                            let mut guard = buf.lock(pair.lock_pool());
                            assert!(guard.ref_count >= 1);
                            guard.update_ref(-1).unwrap();
                        }
                        Err(AccrsError::BufferNotFound) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            });
        }
    });

    assert_eq!(pair.total_pins(), 0);
}

#[test]
fn chaos_readers_and_removing_writers() {
    let (pair, ids) = preload(1000);
    let ids = Arc::new(ids);
    // Shared budget of removals to perform; each writer claims one unit at a
    // time so the 1000 -> 950 transition is exact regardless of how the 4
    // writer threads interleave.
    let removals_remaining = AtomicU32::new(50);

    std::thread::scope(|scope| {
        for _ in 0..16 {
            let pair = &pair;
            let ids = ids.clone();
            scope.spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..2000 {
                    let id = ids[rng.random_range(0..ids.len())];
                    match pair.search(id) {
                        Ok(buf) => {
                            let mut guard = buf.lock(pair.lock_pool());
                            guard.update_ref(-1).unwrap();
                        }
                        Err(AccrsError::BufferNotFound) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            });
        }

        for _ in 0..4 {
            let pair = &pair;
            let ids = ids.clone();
            let removals_remaining = &removals_remaining;
            scope.spawn(move || {
                let mut rng = rand::rng();
                loop {
                    let current = removals_remaining.load(Ordering::Relaxed);
                    if current == 0 {
                        break;
                    }
                    if removals_remaining
                        .compare_exchange(current, current - 1, Ordering::Relaxed, Ordering::Relaxed)
                        .is_err()
                    {
                        continue;
                    }
                    loop {
                        let id = ids[rng.random_range(0..ids.len())];
                        match pair.remove(Tier::Raw, id) {
                            Ok(()) => break,
                            Err(AccrsError::BufferNotFound) => match pair.remove(Tier::Comp, id) {
                                Ok(()) => break,
                                Err(AccrsError::BufferNotFound) => continue,
                                Err(other) => panic!("unexpected error: {other}"),
                            },
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                }
            });
        }
    });

    let stats = pair.stats();
    assert_eq!(stats.raw_count + stats.comp_count, 950);
    assert_eq!(pair.total_pins(), 0);
}
