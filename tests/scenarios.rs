//! Integration coverage for the numbered cache scenarios: insert/lookup/
//! remove, overflow-driven migration to the comp tier, restore on a comp
//! hit, and pop under memory pressure.

use std::sync::Arc;

use accrs::buffer::{Buffer, BufferSource};
use accrs::config::CacheConfig;
use accrs::{Tier, TierPair};

fn padded(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut v = bytes.to_vec();
    v.resize(len, 0);
    v
}

fn pair_with(total_memory: u64, raw_ratio: u8) -> TierPair {
    let config = CacheConfig {
        total_memory,
        raw_ratio,
        ..CacheConfig::default()
    };
    TierPair::new(&config).unwrap()
}

fn insert(pair: &TierPair, id: u32, payload: Vec<u8>) {
    let buf = Buffer::initialize(id, pair.lock_pool(), BufferSource::Bytes(payload)).unwrap();
    pair.add(Tier::Raw, Arc::new(buf)).unwrap();
}

#[test]
fn add_lookup_remove_round_trip() {
    let pair = pair_with(1024 * 1024, 80);
    let payload = padded(b"hello world, this is a test page", 64);
    insert(&pair, 42, payload.clone());

    let found = pair.search(42).unwrap();
    {
        let mut guard = found.lock(pair.lock_pool());
        assert_eq!(guard.data, payload);
        guard.update_ref(-1).unwrap();
    }

    pair.remove(Tier::Raw, 42).unwrap();
    assert!(matches!(
        pair.search(42),
        Err(accrs::AccrsError::BufferNotFound)
    ));
}

#[test]
fn overflow_migrates_to_comp() {
    // A generous comp budget relative to raw so every overflowing buffer has
    // room to land without triggering a pop of its own.
    let pair = pair_with(100_000, 4);
    for id in 1..=10u32 {
        insert(&pair, id, vec![0xAB; 1024]);
    }

    let stats = pair.stats();
    assert_eq!(stats.raw_count + stats.comp_count, 10);
    assert!(stats.raw_count <= 4);

    for id in 1..=10u32 {
        let buf = pair.search(id).unwrap();
        let mut guard = buf.lock(pair.lock_pool());
        guard.update_ref(-1).unwrap();
    }
}

#[test]
fn comp_hit_restores_to_raw() {
    let pair = pair_with(100_000, 4);
    for id in 1..=10u32 {
        insert(&pair, id, vec![id as u8; 1024]);
    }
    let stats_before = pair.stats();
    assert!(stats_before.comp_count > 0);

    // The clock hand starts at the lowest id, so buffer 1 is always the
    // first victim swept into comp by this insertion order.
    let restored = pair.search(1).unwrap();
    let mut guard = restored.lock(pair.lock_pool());
    assert_eq!(guard.comp_length, 0);
    assert_eq!(guard.data, vec![1u8; 1024]);
    guard.update_ref(-1).unwrap();

    let stats_after = pair.stats();
    assert_eq!(stats_after.restores_run, stats_before.restores_run + 1);
}

#[test]
fn update_swaps_payload_in_place() {
    let pair = pair_with(1024 * 1024, 80);
    insert(&pair, 1, padded(b"original", 32));

    pair.update(Tier::Raw, 1, padded(b"replacement", 16)).unwrap();

    let buf = pair.search(1).unwrap();
    let mut guard = buf.lock(pair.lock_pool());
    assert_eq!(guard.data, padded(b"replacement", 16));
    assert!(!guard.dirty);
    guard.update_ref(-1).unwrap();
}

#[test]
fn update_on_already_dirty_buffer_is_refused() {
    let pair = pair_with(1024 * 1024, 80);
    insert(&pair, 1, padded(b"original", 32));

    let buf = pair.search(1).unwrap();
    {
        let mut guard = buf.lock(pair.lock_pool());
        guard.dirty = true;
        guard.update_ref(-1).unwrap();
    }

    assert_eq!(
        pair.update(Tier::Raw, 1, padded(b"replacement", 16)),
        Err(accrs::AccrsError::BufferIsDirty)
    );
}

#[test]
fn pop_evicts_under_memory_pressure() {
    // Equal, tight budgets so the comp tier must pop to make room for
    // buffers swept in from raw.
    let pair = pair_with(8192, 50);
    for id in 1..=20u32 {
        insert(&pair, id, vec![id as u8; 512]);
    }

    let stats = pair.stats();
    assert!(stats.raw_bytes + stats.comp_bytes <= 8192);
    assert!(stats.raw_count + stats.comp_count < 20, "some ids must have been popped outright");
    assert!(stats.pops_run > 0);
}
