//! Hot-path benchmarks: fixed-size alloc/free cycles and multi-size
//! dispatch, including the overflow path.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

fn fixed_pool(c: &mut Criterion) {
    slabforest::init().unwrap();
    let pool = slabforest::create(None, 64, None).unwrap();
    let pool_sync = slabforest::create_sync(None, 64, None).unwrap();

    c.bench_function("fixed/alloc_free", |b| {
        b.iter(|| {
            let block = pool.alloc().unwrap();
            // SAFETY: Block from the live pool, freed in the same iteration.
            unsafe { slabforest::free(black_box(block)) };
        });
    });

    c.bench_function("fixed/alloc_free_sync", |b| {
        b.iter(|| {
            let block = pool_sync.alloc().unwrap();
            // SAFETY: As above.
            unsafe { slabforest::free(black_box(block)) };
        });
    });

    // Deeper occupancy: 32 live blocks cycled through the free list.
    c.bench_function("fixed/cycle_32", |b| {
        b.iter(|| {
            let blocks: Vec<_> = (0..32).map(|_| pool.alloc().unwrap()).collect();
            for block in blocks {
                // SAFETY: As above.
                unsafe { slabforest::free(block) };
            }
        });
    });

    pool_sync.destroy();
    pool.destroy();
    slabforest::finalize();
}

fn multi_dispatch(c: &mut Criterion) {
    slabforest::init().unwrap();

    c.bench_function("multi/ladder_hit", |b| {
        b.iter(|| {
            let block = slabforest::alloc_multi(black_box(100)).unwrap();
            // SAFETY: Block from the global multi-pool, freed immediately.
            unsafe { slabforest::free(block) };
        });
    });

    c.bench_function("multi/overflow_hit", |b| {
        // First request synthesizes the 3 KiB overflow pool; the steady
        // state measured here reuses it.
        b.iter(|| {
            let block = slabforest::alloc_multi(black_box(3000)).unwrap();
            // SAFETY: As above.
            unsafe { slabforest::free(block) };
        });
    });

    slabforest::finalize();
}

criterion_group!(benches, fixed_pool, multi_dispatch);
criterion_main!(benches);
