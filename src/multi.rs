//! Multi-size dispatch
//!
//! A multi-pool is a primary pool plus an ascending ladder of sibling
//! pools. Requests are routed to the first rung whose object size covers
//! them; anything beyond the last rung goes to an overflow pool
//! synthesized on demand beneath the last sibling, rounded up to
//! [`OVERRANGE_UNIT`](crate::OVERRANGE_UNIT) granularity.

use core::ptr::{self, NonNull};
use std::sync::Arc;

use crate::callbacks::SliceCallbacks;
use crate::error::{PoolError, PoolResult};
use crate::layout::OVERRANGE_UNIT;
use crate::pool::slab::{self, Pool};

/// Size ladder of the global multi-pool, and the default for callers that
/// want a general-purpose dispatcher of their own.
pub const DEFAULT_MULTI_SIZES: [usize; 13] = [
    64, 98, 128, 192, 256, 384, 512, 768, 1024, 1280, 1536, 1792, 2048,
];

/// Create a multi-pool: one sibling per ladder rung, all children of
/// `parent`, the first rung doubling as the primary. The ladder must hold
/// at least two strictly ascending rungs.
///
/// In the synchronized flavor every rung carries its own mutex: the
/// primary's lock serializes dispatch (rung scans and overflow synthesis),
/// while each rung's lock protects its slice lists against direct `free`
/// calls, which reach a rung without going through the dispatcher. On
/// mid-ladder failure every sibling created so far is destroyed again.
///
/// # Safety
///
/// The module must be initialized and `parent`, when non-null, must point
/// to a live pool.
pub(crate) unsafe fn create_multi(
    parent: *mut Pool,
    sizes: &[usize],
    callbacks: Option<Arc<dyn SliceCallbacks>>,
    sync: bool,
) -> PoolResult<*mut Pool> {
    // The last rung doubles as the overflow anchor, so a ladder needs at
    // least one rung distinct from it; a single-rung ladder would also
    // make the overflow anchor coincide with the primary, whose lock is
    // already held when overflow pools are spliced beneath the anchor.
    if sizes.len() < 2 {
        return Err(PoolError::invalid_argument(
            "size ladder needs at least two rungs",
        ));
    }
    if sizes.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(PoolError::invalid_argument(
            "size ladder must be strictly ascending",
        ));
    }

    let mut siblings: Vec<NonNull<Pool>> = Vec::with_capacity(sizes.len());
    for &object_size in sizes {
        // SAFETY: Module initialized and parent live per this function's
        // contract; siblings created so far are live until destroyed below.
        let created = unsafe { slab::create(parent, object_size, callbacks.clone(), sync) };
        match created {
            Ok(pool) => {
                // SAFETY: slab::create never returns null on success.
                siblings.push(unsafe { NonNull::new_unchecked(pool) });
            }
            Err(error) => {
                for sibling in siblings {
                    // SAFETY: Each sibling is a live pool created above with
                    // no users yet.
                    unsafe { slab::destroy_subtree(sibling.as_ptr(), true) };
                }
                return Err(error);
            }
        }
    }

    let primary = siblings[0].as_ptr();
    // SAFETY: `primary` was just created and is not yet visible to other
    // threads.
    unsafe { (*primary).multi = Some(siblings) };
    Ok(primary)
}

/// Allocate `size` bytes through a multi-pool primary.
///
/// # Safety
///
/// `primary` must point to a live multi-pool primary.
pub(crate) unsafe fn alloc_from_multi(primary: *mut Pool, size: usize) -> PoolResult<NonNull<u8>> {
    // SAFETY: The primary's lock serializes the dispatcher: sibling scans,
    // overflow-child scans and sibling allocations all happen under it.
    // The sibling table borrow is scoped so no reference into the primary
    // is live when the primary itself is mutated below.
    unsafe {
        let _guard = slab::pool_lock(primary);

        let (mut chosen, overflow_parent) = {
            let Some(siblings) = (*primary).multi.as_ref() else {
                return Err(PoolError::invalid_argument(
                    "handle does not refer to a multi-pool",
                ));
            };
            let overflow_parent = siblings[siblings.len() - 1].as_ptr();
            let mut chosen = ptr::null_mut();
            for sibling in siblings {
                let pool = sibling.as_ptr();
                if (*pool).layout.object_size >= size {
                    chosen = pool;
                    break;
                }
            }
            (chosen, overflow_parent)
        };

        // Reuse an overflow pool synthesized by an earlier oversized
        // request before creating another.
        if chosen.is_null() {
            let mut child = (*overflow_parent).first_child;
            while !child.is_null() {
                if (*child).layout.object_size >= size {
                    chosen = child;
                    break;
                }
                child = (*child).next;
            }
        }

        if chosen.is_null() {
            let bucket = size.div_ceil(OVERRANGE_UNIT) * OVERRANGE_UNIT;
            // slab::create takes the global pool's lock for the control
            // block and the overflow parent's lock for the child splice.
            // Both are distinct from the primary lock held here: ladders
            // have at least two rungs, so the overflow parent is never the
            // primary. The new pool matches the overflow parent's
            // synchronization so direct `free` calls stay serialized
            // against the dispatcher.
            chosen = slab::create(
                overflow_parent,
                bucket,
                (*overflow_parent).callbacks.clone(),
                (*overflow_parent).sync,
            )?;
        }

        if chosen == primary {
            // Already serialized by our own guard; the locking path would
            // deadlock on a non-reentrant mutex.
            slab::alloc_slice_locked(primary)
        } else {
            slab::alloc_slice(chosen)
        }
    }
}
