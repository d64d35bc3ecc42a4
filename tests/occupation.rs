//! Process-wide occupation accounting and the node auto-release rule.

mod common;

use slabforest::AUTO_FREE_THRESHOLD;

#[test]
fn occupation_follows_node_lifetimes() {
    let _guard = common::module_guard();

    slabforest::init().unwrap();
    // Module init itself holds at least the global pool's first node.
    let baseline = slabforest::occupation();
    assert!(baseline > 0);

    let pool = slabforest::create(None, 64, None).unwrap();
    let after_create = slabforest::occupation();
    let node_size = pool.stats().unwrap().node_size;

    // First allocation materializes one node.
    let block = pool.alloc().unwrap();
    assert_eq!(slabforest::occupation(), after_create + node_size);

    // Freeing below the auto-release threshold keeps the node pooled.
    // SAFETY: Live block, freed once.
    unsafe { slabforest::free(block) };
    assert_eq!(slabforest::occupation(), after_create + node_size);
    assert_eq!(pool.stats().unwrap().nodes, 1);

    // Destruction returns the node.
    pool.destroy();
    assert_eq!(slabforest::occupation(), after_create);

    slabforest::finalize();
    assert_eq!(slabforest::occupation(), 0);
}

#[test]
fn one_slice_pools_use_one_node_per_block() {
    let _guard = common::module_guard();

    slabforest::init().unwrap();
    // A slice this large degrades to one slice per node.
    let pool = slabforest::create(None, 64 * 1024, None).unwrap();
    let stats = pool.stats().unwrap();
    assert_eq!(stats.slices_per_node, 1);

    let before = slabforest::occupation();
    let blocks: Vec<_> = (0..4).map(|_| pool.alloc().unwrap()).collect();
    assert_eq!(slabforest::occupation(), before + 4 * stats.node_size);
    assert_eq!(pool.stats().unwrap().nodes, 4);

    for block in blocks {
        // SAFETY: Each block is live and freed exactly once.
        unsafe { slabforest::free(block) };
    }

    pool.destroy();
    slabforest::finalize();
}

/// Push occupation past the threshold, then free everything and watch
/// nodes drain back to the system instead of staying pinned.
#[test]
#[ignore = "allocates ~640 MiB from the system"]
fn auto_release_drains_idle_nodes_past_the_threshold() {
    let _guard = common::module_guard();

    slabforest::init().unwrap();
    let pool = slabforest::create(None, 1024 * 1024, None).unwrap();
    let node_size = pool.stats().unwrap().node_size;
    assert_eq!(pool.stats().unwrap().slices_per_node, 1);

    let count = AUTO_FREE_THRESHOLD / node_size + 128;
    let blocks: Vec<_> = (0..count).map(|_| pool.alloc().unwrap()).collect();
    let peak = slabforest::occupation();
    assert!(peak >= AUTO_FREE_THRESHOLD);

    for block in blocks {
        // SAFETY: Each block is live and freed exactly once.
        unsafe { slabforest::free(block) };
    }

    // Nodes were released while occupation stayed at or above the
    // threshold, then pooling resumed: the counter must have drained below
    // the threshold instead of staying at the peak.
    let drained = slabforest::occupation();
    assert!(drained < AUTO_FREE_THRESHOLD);
    assert!(drained < peak);
    assert!(pool.stats().unwrap().nodes < count);

    pool.destroy();
    slabforest::finalize();
    assert_eq!(slabforest::occupation(), 0);
}
