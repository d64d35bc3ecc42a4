//! Node arenas
//!
//! A node is one contiguous system allocation owned by a pool, carved into
//! the pool's fixed slice count. Fresh slices come from a bump region at
//! the tail (`first_avail`); recycled slices live on the pool-wide free
//! list as this node's contiguous sublist.
//!
//! # Safety
//!
//! Nodes are raw memory obtained from `std::alloc` and are only ever
//! touched under the owning pool's lock (or from single-threaded teardown).
//! Every byte of a node is accounted for in the process-wide occupation
//! counter from allocation until release.

use core::ptr;
use std::alloc::{Layout, alloc, dealloc};
use std::sync::atomic::Ordering;

use crate::error::{PoolError, PoolResult};
use crate::global::OCCUPATION;
use crate::layout::{NODE_HEADER_SIZE, SLICE_ALIGN};
use crate::pool::slab::Pool;
use crate::pool::slice::Slice;

#[cfg(feature = "logging")]
use tracing::trace;

/// Header at the front of every node allocation.
#[repr(C)]
pub(crate) struct Node {
    pub(crate) owner: *mut Pool,
    pub(crate) prev: *mut Node,
    pub(crate) next: *mut Node,
    /// Bounds of this node's contiguous sublist within the pool free list.
    pub(crate) free_slice_head: *mut Slice,
    pub(crate) free_slice_tail: *mut Slice,
    /// Slices handed out and not yet freed.
    pub(crate) using_slice_count: usize,
    /// Slices ever carved from the bump region; never decremented.
    pub(crate) used_slice_count: usize,
    /// Bump pointer into the never-carved tail region.
    pub(crate) first_avail: *mut u8,
}

const _: () = assert!(core::mem::align_of::<Node>() <= SLICE_ALIGN);

/// Allocate a fresh node for `pool`, prepend it to the pool's node list and
/// install it as the carving target.
///
/// # Safety
///
/// `pool` must point to a live pool whose lock the caller holds (or that is
/// otherwise unreachable by other threads).
pub(crate) unsafe fn allocate_for(pool: *mut Pool) -> PoolResult<()> {
    // SAFETY: Caller guarantees `pool` is live and locked; the layout is
    // non-zero because every pool geometry includes the node header.
    unsafe {
        let node_size = (*pool).layout.node_size;
        let layout = Layout::from_size_align_unchecked(node_size, SLICE_ALIGN);
        let base = alloc(layout);
        let Some(base) = ptr::NonNull::new(base) else {
            return Err(PoolError::allocation_failed(node_size));
        };

        OCCUPATION.fetch_add(node_size, Ordering::AcqRel);

        let node = base.as_ptr().cast::<Node>();
        (*node).owner = pool;
        (*node).free_slice_head = ptr::null_mut();
        (*node).free_slice_tail = ptr::null_mut();
        (*node).using_slice_count = 0;
        (*node).used_slice_count = 0;
        (*node).first_avail = base.as_ptr().add(NODE_HEADER_SIZE);

        (*node).prev = ptr::null_mut();
        (*node).next = (*pool).first_node;
        if !(*node).next.is_null() {
            (*(*node).next).prev = node;
        }
        (*pool).first_node = node;
        (*pool).newly_alloc_node = node;

        #[cfg(feature = "logging")]
        {
            let object_size = (*pool).layout.object_size;
            trace!(node_size, object_size, "allocated pool node");
        }
    }

    Ok(())
}

/// Carve the next fresh slice out of the pool's newly allocated node.
///
/// The slice is zeroed and stamped with tag 1, so tag 0 always means
/// "never handed out". Returns null when the pool has no carving target.
///
/// # Safety
///
/// `pool` must point to a live pool whose lock the caller holds.
pub(crate) unsafe fn carve(pool: *mut Pool) -> *mut Slice {
    // SAFETY: Caller guarantees `pool` is live and locked. `first_avail`
    // stays within the node because `used_slice_count` is checked against
    // `slice_count` below and the carving target is cleared when full.
    unsafe {
        let node = (*pool).newly_alloc_node;
        if node.is_null() {
            return ptr::null_mut();
        }

        (*node).used_slice_count += 1;
        (*node).using_slice_count += 1;

        let slice = (*node).first_avail.cast::<Slice>();
        ptr::write_bytes(slice.cast::<u8>(), 0, (*pool).layout.slice_size);
        (*slice).prev = ptr::null_mut();
        (*slice).next = ptr::null_mut();
        (*slice).node = node;
        (*slice).tag = 1;
        (*node).first_avail = (*node).first_avail.add((*pool).layout.slice_size);

        if (*node).used_slice_count == (*pool).layout.slice_count {
            (*pool).newly_alloc_node = ptr::null_mut();
        }

        slice
    }
}

/// Return a fully idle node to the system allocator.
///
/// Splices the node's contiguous free sublist out of the pool-wide free
/// list, unlinks the node and releases its memory. Only legal when no slice
/// of the node is in use.
///
/// # Safety
///
/// `pool` invariants: caller holds the owning pool's lock and
/// `using_slice_count == 0`.
pub(crate) unsafe fn release(node: *mut Node) {
    // SAFETY: Caller guarantees the owning pool is locked and the node is
    // idle; all pointers below are list members maintained under that lock.
    unsafe {
        debug_assert_eq!((*node).using_slice_count, 0);
        let pool = (*node).owner;

        if !(*node).free_slice_head.is_null() {
            let head = (*node).free_slice_head;
            let tail = (*node).free_slice_tail;
            if !(*tail).next.is_null() {
                (*(*tail).next).prev = (*head).prev;
            }
            if !(*head).prev.is_null() {
                (*(*head).prev).next = (*tail).next;
            }
            if (*pool).first_free_slice == head {
                (*pool).first_free_slice = (*tail).next;
            }
        }

        if (*pool).newly_alloc_node == node {
            (*pool).newly_alloc_node = ptr::null_mut();
        }

        if !(*node).next.is_null() {
            (*(*node).next).prev = (*node).prev;
        }
        if !(*node).prev.is_null() {
            (*(*node).prev).next = (*node).next;
        } else {
            (*pool).first_node = (*node).next;
        }

        #[cfg(feature = "logging")]
        {
            let node_size = (*pool).layout.node_size;
            let object_size = (*pool).layout.object_size;
            trace!(node_size, object_size, "releasing idle pool node");
        }

        dealloc_raw(node);
    }
}

/// Release a node's memory and settle the occupation counter.
///
/// # Safety
///
/// `node` must be a live node whose owner pool is still readable; no list
/// bookkeeping is performed, callers tear the lists down themselves.
pub(crate) unsafe fn dealloc_raw(node: *mut Node) {
    // SAFETY: `node` was produced by `allocate_for` with exactly this
    // layout; the owner pool outlives its nodes so reading node_size is
    // valid, and each node is deallocated exactly once.
    unsafe {
        let node_size = (*(*node).owner).layout.node_size;
        OCCUPATION.fetch_sub(node_size, Ordering::AcqRel);
        dealloc(
            node.cast::<u8>(),
            Layout::from_size_align_unchecked(node_size, SLICE_ALIGN),
        );
    }
}
