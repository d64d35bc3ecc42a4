//! Callback delivery: once per alloc, once per free, and a final
//! `on_free` for every block still live at destroy time.

mod common;

use core::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use slabforest::SliceCallbacks;

#[derive(Default)]
struct Counting {
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

impl Counting {
    fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }
}

impl SliceCallbacks for Counting {
    fn on_alloc(&self, _payload: NonNull<u8>) {
        self.allocs.fetch_add(1, Ordering::SeqCst);
    }

    fn on_free(&self, _payload: NonNull<u8>) {
        self.frees.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn destroy_flushes_leaked_blocks() {
    let _guard = common::module_guard();

    slabforest::init().unwrap();
    let counting = Arc::new(Counting::default());
    let pool = slabforest::create(None, 64, Some(counting.clone())).unwrap();

    let a = pool.alloc().unwrap();
    let b = pool.alloc().unwrap();
    let _leaked = pool.alloc().unwrap();
    // SAFETY: `a` and `b` are live blocks from `pool`, freed once each.
    unsafe {
        slabforest::free(a);
        slabforest::free(b);
    }

    assert_eq!(counting.allocs(), 3);
    assert_eq!(counting.frees(), 2);

    // The third block is still live: destroy fires its on_free.
    pool.destroy();
    assert_eq!(counting.allocs(), 3);
    assert_eq!(counting.frees(), 3);

    slabforest::finalize();
}

#[test]
fn balanced_usage_balances_callbacks() {
    let _guard = common::module_guard();

    slabforest::init().unwrap();
    let counting = Arc::new(Counting::default());
    let pool = slabforest::create_sync(None, 32, Some(counting.clone())).unwrap();

    for round in 0..50 {
        let blocks: Vec<_> = (0..=round % 7).map(|_| pool.alloc().unwrap()).collect();
        for block in blocks {
            // SAFETY: Every block is live and freed exactly once.
            unsafe { slabforest::free(block) };
        }
    }

    assert_eq!(counting.allocs(), counting.frees());
    pool.destroy();
    // Nothing was live at destroy time, so the balance holds.
    assert_eq!(counting.allocs(), counting.frees());

    slabforest::finalize();
}

#[test]
fn finalize_flushes_surviving_pools() {
    let _guard = common::module_guard();

    slabforest::init().unwrap();
    let counting = Arc::new(Counting::default());
    let pool = slabforest::create(None, 16, Some(counting.clone())).unwrap();

    let _leaked = pool.alloc().unwrap();
    assert_eq!(counting.allocs(), 1);
    assert_eq!(counting.frees(), 0);

    // No explicit destroy: finalize tears the forest down and still
    // delivers the final on_free.
    slabforest::finalize();
    assert_eq!(counting.frees(), 1);
    assert_eq!(slabforest::occupation(), 0);
}

#[test]
fn overflow_pools_inherit_callbacks() {
    let _guard = common::module_guard();

    slabforest::init().unwrap();
    let counting = Arc::new(Counting::default());
    let multi =
        slabforest::create_multi(None, &[64, 256, 1024], Some(counting.clone())).unwrap();

    // In-ladder request.
    let small = multi.alloc_multi(100).unwrap();
    assert_eq!(counting.allocs(), 1);

    // Oversized request lands in a synthesized overflow pool that carries
    // the same callbacks.
    let big = multi.alloc_multi(5000).unwrap();
    assert_eq!(counting.allocs(), 2);

    // SAFETY: Both blocks are live and freed exactly once.
    unsafe {
        slabforest::free(small);
        slabforest::free(big);
    }
    assert_eq!(counting.frees(), 2);

    multi.destroy();
    assert_eq!(counting.allocs(), counting.frees());

    slabforest::finalize();
}
