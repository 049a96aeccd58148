//! # Low-Lock Map Benchmark
//!
//! ARCHITECT'S CHALLENGE: A player lookup on the primary thread must cost
//! less than a hash lookup behind a contended lock.
//!
//! This benchmark measures:
//! 1. Point reads on a populated map
//! 2. Point reads while a background thread inserts and removes
//! 3. Bulk removal of logged-out players

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sentinel_core::LowLockMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn populated(players: u64) -> LowLockMap<u64, [u64; 8]> {
    let map = LowLockMap::with_capacity(players as usize);
    for id in 0..players {
        map.insert(id, [id; 8]);
    }
    map
}

/// Uncontended point reads.
fn bench_point_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("low_lock_map_get");

    for players in [100u64, 1_000, 10_000] {
        let map = populated(players);
        group.bench_with_input(BenchmarkId::new("get", players), &players, |b, &n| {
            let mut id = 0;
            b.iter(|| {
                id = (id + 7) % n;
                black_box(map.get(&id));
            });
        });
    }

    group.finish();
}

/// Point reads while a writer churns the map.
fn bench_reads_under_churn(c: &mut Criterion) {
    let map = Arc::new(populated(1_000));
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let map = Arc::clone(&map);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut id = 1_000u64;
            while !stop.load(Ordering::Relaxed) {
                map.insert(id, [id; 8]);
                map.remove(&(id - 500));
                id += 1;
            }
        })
    };

    c.bench_function("low_lock_map_get_under_churn", |b| {
        let mut id = 0u64;
        b.iter(|| {
            id = (id + 13) % 1_000;
            black_box(map.get(&id));
        });
    });

    stop.store(true, Ordering::Relaxed);
    let _ = writer.join();
}

/// Removal of a batch of logged-out players.
fn bench_remove_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("low_lock_map_remove_batch");

    for batch in [10u64, 100] {
        let keys: Vec<u64> = (0..batch).collect();
        group.bench_with_input(BenchmarkId::new("remove_batch", batch), &batch, |b, _| {
            b.iter_batched(
                || populated(1_000),
                |map| black_box(map.remove_batch(&keys)),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_point_reads, bench_reads_under_churn, bench_remove_batch);
criterion_main!(benches);
