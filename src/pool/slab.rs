//! Pool control blocks and the slab hot path
//!
//! A `Pool` is a family of nodes serving one object size. It owns the
//! pool-wide free list (a concatenation of per-node contiguous sublists),
//! the in-use list, and its position in the pool tree. Every control block
//! except the global pool's is itself a slice allocated from the global
//! pool, which is what makes handle staleness checkable through tags.
//!
//! # Safety
//!
//! Pools live in raw slice memory and are reached through `*mut Pool`.
//! All list surgery happens under the pool's lock when it is synchronized;
//! unsynchronized pools rely on external serialization, exactly like the
//! in-use lists they thread. Pool locks nest in two places, both acyclic:
//! the child-list splice during create and destroy takes the parent's
//! lock (parent before child), and the multi-size dispatcher holds its
//! primary's lock while allocating from a rung or splicing an overflow
//! pool beneath the last rung — the order there is primary, then rung,
//! then the global pool, and a ladder's primary is never its own overflow
//! anchor.
//!
//! Teardown is recursive: destroying a pool detaches it from its parent,
//! destroys its subtree, flushes `on_free` for every still-live block,
//! returns all nodes to the system and finally returns the control block
//! slice to the global pool with the sentinel tag installed, so every
//! outstanding handle to the subtree goes stale atomically.

use core::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::{Mutex, MutexGuard};

use crate::callbacks::SliceCallbacks;
use crate::error::{PoolError, PoolResult};
use crate::global::{self, OCCUPATION};
use crate::layout::{AUTO_FREE_THRESHOLD, SLICE_ALIGN, SliceLayout};
use crate::pool::node::{self, Node};
use crate::pool::slice::Slice;

#[cfg(feature = "logging")]
use tracing::debug;

/// Tag installed in a destroyed pool's control block; no live slice ever
/// carries it, so it invalidates every outstanding handle.
pub(crate) const STALE_TAG: i32 = -1;

/// Control block of one slab pool.
#[repr(C)]
pub(crate) struct Pool {
    // Tree links: parents own children, back-edges are non-owning.
    pub(crate) parent: *mut Pool,
    pub(crate) first_child: *mut Pool,
    pub(crate) prev: *mut Pool,
    pub(crate) next: *mut Pool,

    /// Sibling table of a multi-size primary; `None` on plain pools.
    pub(crate) multi: Option<Vec<NonNull<Pool>>>,

    pub(crate) layout: SliceLayout,

    pub(crate) first_node: *mut Node,
    /// Node with an unexhausted bump region, if any.
    pub(crate) newly_alloc_node: *mut Node,

    pub(crate) first_free_slice: *mut Slice,
    pub(crate) first_occupied_slice: *mut Slice,

    pub(crate) callbacks: Option<Arc<dyn SliceCallbacks>>,

    /// Tag of the slice backing this control block, mirrored here so a
    /// handle can be validated without trusting its pointer.
    pub(crate) slice_tag: i32,

    pub(crate) sync: bool,
    pub(crate) mutex: Mutex<()>,
}

const _: () = assert!(core::mem::align_of::<Pool>() <= SLICE_ALIGN);

// SAFETY: Pool is reached only through raw pointers; synchronized pools
// serialize on their own mutex and unsynchronized pools document external
// serialization. The Send bound exists so the statically stored global
// pool can be shared (see SyncUnsafeCell).
unsafe impl Send for Pool {}

impl Pool {
    /// Statically storable placeholder; `init` fills in the real geometry.
    pub(crate) const fn placeholder() -> Self {
        Self {
            parent: ptr::null_mut(),
            first_child: ptr::null_mut(),
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
            multi: None,
            layout: SliceLayout::zeroed(),
            first_node: ptr::null_mut(),
            newly_alloc_node: ptr::null_mut(),
            first_free_slice: ptr::null_mut(),
            first_occupied_slice: ptr::null_mut(),
            callbacks: None,
            slice_tag: 0,
            sync: false,
            mutex: Mutex::new(()),
        }
    }
}

/// Take the pool's lock if it is a synchronized pool.
///
/// # Safety
///
/// `pool` must point to a live pool that outlives the returned guard.
#[inline]
pub(crate) unsafe fn pool_lock<'a>(pool: *mut Pool) -> Option<MutexGuard<'a, ()>> {
    // SAFETY: Caller guarantees the pool (and therefore its mutex) outlives
    // the guard; the mutex itself is never moved while the pool is live.
    unsafe {
        if (*pool).sync {
            let mutex: &'a Mutex<()> = &(*pool).mutex;
            Some(mutex.lock())
        } else {
            None
        }
    }
}

/// Allocate one slice from `pool` and return its payload.
///
/// # Safety
///
/// `pool` must point to a live pool.
pub(crate) unsafe fn alloc_slice(pool: *mut Pool) -> PoolResult<NonNull<u8>> {
    // SAFETY: Guard taken before the list surgery, dropped after the
    // callback, per the documented callback locking discipline.
    unsafe {
        let _guard = pool_lock(pool);
        alloc_slice_locked(pool)
    }
}

/// Allocation hot path with the pool lock already held (or the pool
/// otherwise serialized).
///
/// # Safety
///
/// `pool` must point to a live pool; the caller must hold its lock if it
/// is synchronized.
pub(crate) unsafe fn alloc_slice_locked(pool: *mut Pool) -> PoolResult<NonNull<u8>> {
    // SAFETY: All list pointers below are maintained under the pool lock
    // the caller holds. The popped slice is always the head of its node's
    // contiguous sublist, so detaching it only has to fix that node's
    // bounds.
    unsafe {
        let slice;
        if !(*pool).first_free_slice.is_null() {
            slice = (*pool).first_free_slice;
            let owner = (*slice).node;

            (*pool).first_free_slice = (*slice).next;
            (*owner).free_slice_head = ptr::null_mut();
            if !(*pool).first_free_slice.is_null() {
                (*(*pool).first_free_slice).prev = ptr::null_mut();
                // The successor continues this node's sublist only if it
                // still belongs to the same node.
                if (*(*pool).first_free_slice).node == owner {
                    (*owner).free_slice_head = (*pool).first_free_slice;
                }
            }
            if (*owner).free_slice_head.is_null() {
                (*owner).free_slice_tail = ptr::null_mut();
            }

            (*slice).prev = ptr::null_mut();
            (*slice).next = ptr::null_mut();
            (*slice).tag += 1;
            (*owner).using_slice_count += 1;
        } else {
            if (*pool).newly_alloc_node.is_null() {
                node::allocate_for(pool)?;
            }
            slice = node::carve(pool);
            if slice.is_null() {
                return Err(PoolError::allocation_failed((*pool).layout.node_size));
            }
        }

        (*slice).prev = ptr::null_mut();
        (*slice).next = (*pool).first_occupied_slice;
        if !(*pool).first_occupied_slice.is_null() {
            (*(*pool).first_occupied_slice).prev = slice;
        }
        (*pool).first_occupied_slice = slice;

        let payload = Slice::payload(slice);
        if let Some(cb) = (*pool).callbacks.as_ref() {
            cb.on_alloc(payload);
        }
        Ok(payload)
    }
}

/// Return a payload to its pool; may return the whole node to the system.
///
/// # Safety
///
/// `payload` must have come from [`alloc_slice`] on a still-live pool and
/// must not be used afterwards.
pub(crate) unsafe fn free_payload(payload: NonNull<u8>) {
    // SAFETY: The slice header sits at a fixed negative offset from the
    // payload; node and pool are recovered through intrusive back-pointers
    // that stay valid for the lifetime of the block.
    unsafe {
        let slice = Slice::from_payload(payload);
        let owner = (*slice).node;
        let pool = (*owner).owner;

        let _guard = pool_lock(pool);

        (*slice).tag += 1;
        (*owner).using_slice_count -= 1;

        if let Some(cb) = (*pool).callbacks.as_ref() {
            cb.on_free(payload);
        }

        // Unlink from the in-use list.
        if !(*slice).next.is_null() {
            (*(*slice).next).prev = (*slice).prev;
        }
        if !(*slice).prev.is_null() {
            (*(*slice).prev).next = (*slice).next;
        } else {
            (*pool).first_occupied_slice = (*slice).next;
        }

        if (*owner).using_slice_count == 0
            && OCCUPATION.load(Ordering::Acquire) >= AUTO_FREE_THRESHOLD
        {
            // The slice being freed is abandoned with its node; every other
            // slice of the node already sits on the free sublist.
            node::release(owner);
        } else if (*owner).free_slice_head.is_null() {
            // First free slice of this node: start its sublist at the
            // global head.
            (*owner).free_slice_head = slice;
            (*owner).free_slice_tail = slice;
            (*slice).prev = ptr::null_mut();
            (*slice).next = (*pool).first_free_slice;
            if !(*pool).first_free_slice.is_null() {
                (*(*pool).first_free_slice).prev = slice;
            }
            (*pool).first_free_slice = slice;
        } else {
            // Splice directly after the node's sublist tail to keep the
            // sublist contiguous.
            let tail = (*owner).free_slice_tail;
            (*slice).next = (*tail).next;
            if !(*slice).next.is_null() {
                (*(*slice).next).prev = slice;
            }
            (*tail).next = slice;
            (*slice).prev = tail;
            (*owner).free_slice_tail = slice;
        }
    }
}

/// Create a pool under `parent` (null means the global pool).
///
/// The control block is a slice of the global pool; the returned pointer's
/// `slice_tag` is the tag a handle must capture.
///
/// # Safety
///
/// The module must be initialized and `parent`, when non-null, must point
/// to a live pool.
pub(crate) unsafe fn create(
    parent: *mut Pool,
    object_size: usize,
    callbacks: Option<Arc<dyn SliceCallbacks>>,
    sync: bool,
) -> PoolResult<*mut Pool> {
    if object_size == 0 {
        return Err(PoolError::invalid_argument("object size must be non-zero"));
    }

    // SAFETY: The control slice payload is sized for a Pool (the global
    // pool's object size is size_of::<Pool>()) and aligned to SLICE_ALIGN,
    // which covers Pool's alignment. ptr::write initializes every field,
    // so reused slice memory never leaks stale state.
    unsafe {
        let payload = alloc_slice(global::global_pool())?;
        let slice = Slice::from_payload(payload);
        let pool = payload.as_ptr().cast::<Pool>();

        let parent = if parent.is_null() {
            global::global_pool()
        } else {
            parent
        };

        ptr::write(
            pool,
            Pool {
                parent,
                first_child: ptr::null_mut(),
                prev: ptr::null_mut(),
                next: ptr::null_mut(),
                multi: None,
                layout: SliceLayout::for_object_size(object_size),
                first_node: ptr::null_mut(),
                newly_alloc_node: ptr::null_mut(),
                first_free_slice: ptr::null_mut(),
                first_occupied_slice: ptr::null_mut(),
                callbacks,
                slice_tag: (*slice).tag,
                sync,
                mutex: Mutex::new(()),
            },
        );

        // Splice into the parent's child list; parent lock first, never
        // while holding this pool's lock.
        {
            let _parent_guard = pool_lock(parent);
            (*pool).next = (*parent).first_child;
            if !(*pool).next.is_null() {
                (*(*pool).next).prev = pool;
            }
            (*parent).first_child = pool;
        }

        Ok(pool)
    }
}

/// Recursively destroy `pool` and its subtree.
///
/// `lock_parent` is true for the subtree root (its parent is still live
/// and possibly shared); recursive calls skip the parent lock because the
/// whole subtree is already unreachable.
///
/// # Safety
///
/// `pool` must point to a live pool with no operations in flight anywhere
/// in its subtree.
pub(crate) unsafe fn destroy_subtree(pool: *mut Pool, lock_parent: bool) {
    // SAFETY: Caller guarantees exclusive access to the subtree. The parent
    // splice is the only step that touches shared state, and it holds the
    // parent's lock (parent-before-child order, no other lock held).
    unsafe {
        let parent = (*pool).parent;
        {
            let _parent_guard = if lock_parent && !parent.is_null() {
                pool_lock(parent)
            } else {
                None
            };
            if !(*pool).next.is_null() {
                (*(*pool).next).prev = (*pool).prev;
            }
            if !(*pool).prev.is_null() {
                (*(*pool).prev).next = (*pool).next;
            } else if !parent.is_null() {
                (*parent).first_child = (*pool).next;
            }
        }

        while !(*pool).first_child.is_null() {
            destroy_subtree((*pool).first_child, false);
        }

        #[cfg(feature = "logging")]
        {
            let object_size = (*pool).layout.object_size;
            debug!(object_size, "destroying pool");
        }

        let callbacks;
        let sibling_table;
        {
            let _guard = pool_lock(pool);
            callbacks = (*pool).callbacks.take();
            sibling_table = (*pool).multi.take();

            // Final on_free for every block still live.
            if let Some(cb) = callbacks.as_ref() {
                let mut occupied = (*pool).first_occupied_slice;
                while !occupied.is_null() {
                    (*pool).first_occupied_slice = (*occupied).next;
                    cb.on_free(Slice::payload(occupied));
                    occupied = (*pool).first_occupied_slice;
                }
            }

            let mut current = (*pool).first_node;
            while !current.is_null() {
                (*pool).first_node = (*current).next;
                node::dealloc_raw(current);
                current = (*pool).first_node;
            }

            (*pool).newly_alloc_node = ptr::null_mut();
            (*pool).first_free_slice = ptr::null_mut();
            (*pool).first_occupied_slice = ptr::null_mut();
            (*pool).parent = ptr::null_mut();
            (*pool).slice_tag = STALE_TAG;
        }
        drop(sibling_table);
        drop(callbacks);

        // Return the control block slice, except for the statically stored
        // global pool.
        if pool != global::global_pool() {
            free_payload(NonNull::new_unchecked(pool.cast::<u8>()));
        }
    }
}

/// Point-in-time counters of one pool, taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Caller-visible bucket size.
    pub object_size: usize,
    /// Header + aligned payload per slice.
    pub slice_size: usize,
    /// Slices carved per node.
    pub slices_per_node: usize,
    /// Bytes requested from the system per node.
    pub node_size: usize,
    /// Live nodes.
    pub nodes: usize,
    /// Slices handed out and not yet freed.
    pub slices_in_use: usize,
    /// Slices ever carved across all live nodes.
    pub slices_used: usize,
    /// Length of the pool-wide free list.
    pub free_slices: usize,
}

/// Snapshot `pool`'s counters.
///
/// # Safety
///
/// `pool` must point to a live pool.
pub(crate) unsafe fn snapshot(pool: *mut Pool) -> PoolStats {
    // SAFETY: Walks only under the pool's lock; all list links are
    // consistent at that point.
    unsafe {
        let _guard = pool_lock(pool);

        let mut nodes = 0;
        let mut slices_in_use = 0;
        let mut slices_used = 0;
        let mut current = (*pool).first_node;
        while !current.is_null() {
            nodes += 1;
            slices_in_use += (*current).using_slice_count;
            slices_used += (*current).used_slice_count;
            current = (*current).next;
        }

        let mut free_slices = 0;
        let mut free = (*pool).first_free_slice;
        while !free.is_null() {
            free_slices += 1;
            free = (*free).next;
        }

        PoolStats {
            object_size: (*pool).layout.object_size,
            slice_size: (*pool).layout.slice_size,
            slices_per_node: (*pool).layout.slice_count,
            node_size: (*pool).layout.node_size,
            nodes,
            slices_in_use,
            slices_used,
            free_slices,
        }
    }
}
