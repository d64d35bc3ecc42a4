//! # slabforest
//!
//! Hierarchical multi-size slab memory pools with tag-validated handles.
//!
//! The crate is built for programs that perform many allocations of a few
//! characteristic sizes but still need occasional irregular blocks:
//! - Fixed-size pools with an O(1) alloc/free hot path over intrusive
//!   free lists
//! - A multi-size dispatcher over an ascending ladder of pools, with
//!   on-demand overflow pools for oversized requests
//! - A pool *forest*: pools are created under a parent (the global pool by
//!   default) and destroying a parent tears down its whole subtree
//! - Stale-handle detection through per-slice generation tags, with no
//!   tracking of outstanding handles
//! - Optional per-pool mutexes; unsynchronized pools cost nothing for
//!   single-threaded use
//!
//! ## Quick Start
//!
//! ```rust
//! use slabforest::prelude::*;
//!
//! fn main() -> PoolResult<()> {
//!     slabforest::init()?;
//!
//!     let pool = slabforest::create(None, 24, None)?;
//!     let block = pool.alloc()?;
//!     // SAFETY: `block` came from `pool.alloc()` above.
//!     unsafe {
//!         assert_eq!(slabforest::block_size(block), 24);
//!         slabforest::free(block);
//!     }
//!     pool.destroy();
//!
//!     slabforest::finalize();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured logging through `tracing`
//!
//! ## Memory model
//!
//! Blocks are untyped byte regions. Every block is preceded by an
//! intrusive header, so [`free`] and [`block_size`] recover the owning
//! pool from the bare pointer. Nodes (the system allocations backing a
//! pool) are only returned to the operating system by pool destruction or
//! by the auto-release rule: freeing the last live block of a node while
//! the process-wide [`occupation`] is at least [`AUTO_FREE_THRESHOLD`]
//! releases the node.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
// Pointer-heavy slab code is reviewed per-site
#![allow(clippy::cast_ptr_alignment)]
// i32 generation tags deliberately wrap like the occupancy counters they
// are compared against
#![allow(clippy::cast_possible_wrap)]

pub mod error;

mod callbacks;
mod global;
mod handle;
mod layout;
mod multi;
mod pool;
mod sync_cell;

pub use crate::callbacks::SliceCallbacks;
pub use crate::error::{PoolError, PoolResult};
pub use crate::global::occupation;
pub use crate::handle::PoolHandle;
pub use crate::layout::{AUTO_FREE_THRESHOLD, MAX_SLICE_BYTES, OVERRANGE_UNIT, SLICE_CAP};
pub use crate::multi::DEFAULT_MULTI_SIZES;
pub use crate::pool::PoolStats;

use core::ptr::NonNull;
use std::sync::Arc;

use crate::pool::slab;
use crate::pool::slice::Slice;

/// Convenient re-exports of commonly used types.
pub mod prelude {
    //! Commonly used types and functions.

    pub use crate::error::{PoolError, PoolResult};
    pub use crate::handle::PoolHandle;
    pub use crate::pool::PoolStats;
    pub use crate::{SliceCallbacks, alloc_multi, block_size, free, occupation};
}

/// Initialize the pool module.
///
/// The first call sets up the global pool and the default multi-pool
/// (synchronized, ladder [`DEFAULT_MULTI_SIZES`]); nested calls only
/// increment a reference count. Must be balanced by [`finalize`].
///
/// # Errors
///
/// Fails if creating the default multi-pool fails (allocation failure);
/// the module is left uninitialized and the call may be retried.
pub fn init() -> PoolResult<()> {
    global::init()
}

/// Finalize the pool module.
///
/// Decrements the reference count; the balancing call for the first
/// [`init`] recursively destroys every pool still alive (firing `on_free`
/// for leaked blocks) and returns all memory to the system. Every handle
/// goes stale. Calling without a matching `init` is a no-op.
///
/// Must not race in-flight pool operations on other threads.
pub fn finalize() {
    global::finalize()
}

/// Create an unsynchronized pool of `object_size` byte blocks.
///
/// `parent` defaults to the global pool; destroying the parent destroys
/// this pool. The callbacks, when given, observe every block (see
/// [`SliceCallbacks`]).
///
/// # Errors
///
/// Fails on a stale parent handle, `object_size == 0`, allocation failure
/// or an uninitialized module.
pub fn create(
    parent: Option<PoolHandle>,
    object_size: usize,
    callbacks: Option<Arc<dyn SliceCallbacks>>,
) -> PoolResult<PoolHandle> {
    create_pool(parent, object_size, callbacks, false)
}

/// Create a synchronized pool; as [`create`], plus a per-pool mutex that
/// serializes every operation on the pool.
pub fn create_sync(
    parent: Option<PoolHandle>,
    object_size: usize,
    callbacks: Option<Arc<dyn SliceCallbacks>>,
) -> PoolResult<PoolHandle> {
    create_pool(parent, object_size, callbacks, true)
}

/// Create an unsynchronized multi-pool over the strictly ascending
/// `sizes` ladder.
///
/// The returned handle allocates via [`PoolHandle::alloc_multi`].
/// Oversized requests synthesize overflow pools beneath the last rung,
/// inheriting its callbacks.
///
/// # Errors
///
/// As [`create`], plus a ladder with fewer than two rungs or one that is
/// not strictly ascending.
pub fn create_multi(
    parent: Option<PoolHandle>,
    sizes: &[usize],
    callbacks: Option<Arc<dyn SliceCallbacks>>,
) -> PoolResult<PoolHandle> {
    create_multi_pool(parent, sizes, callbacks, false)
}

/// Create a synchronized multi-pool; the primary's mutex serializes the
/// whole dispatcher.
pub fn create_multi_sync(
    parent: Option<PoolHandle>,
    sizes: &[usize],
    callbacks: Option<Arc<dyn SliceCallbacks>>,
) -> PoolResult<PoolHandle> {
    create_multi_pool(parent, sizes, callbacks, true)
}

/// Allocate `size` bytes from the default multi-pool.
///
/// # Errors
///
/// Fails when the module is not initialized or on allocation failure.
pub fn alloc_multi(size: usize) -> PoolResult<NonNull<u8>> {
    let handle = global::global_multi();
    if !handle.is_valid() {
        return Err(PoolError::not_initialized());
    }
    handle.alloc_multi(size)
}

/// Bucket size of a pool-allocated block.
///
/// This is the owning pool's object size, not the size originally
/// requested from a multi-pool.
///
/// # Safety
///
/// `payload` must be a live block returned by [`PoolHandle::alloc`],
/// [`PoolHandle::alloc_multi`] or [`alloc_multi`]; any other pointer reads
/// unrelated memory.
#[must_use]
pub unsafe fn block_size(payload: NonNull<u8>) -> usize {
    // SAFETY: Caller guarantees `payload` came from a pool, so the
    // intrusive header and its back-pointers are intact.
    unsafe {
        let slice = Slice::from_payload(payload);
        (*(*(*slice).node).owner).layout.object_size
    }
}

/// Return a block to its pool.
///
/// Fires the pool's `on_free` callback, then either re-threads the slice
/// onto the free list or, when the block was the node's last live slice
/// and [`occupation`] is at least [`AUTO_FREE_THRESHOLD`], returns the
/// whole node to the system.
///
/// # Safety
///
/// `payload` must be a live block returned by one of the allocation
/// functions, its pool must still be alive, and the block must not be
/// used (or freed) again afterwards.
pub unsafe fn free(payload: NonNull<u8>) {
    // SAFETY: Forwarded caller contract.
    unsafe { slab::free_payload(payload) }
}

fn create_pool(
    parent: Option<PoolHandle>,
    object_size: usize,
    callbacks: Option<Arc<dyn SliceCallbacks>>,
    sync: bool,
) -> PoolResult<PoolHandle> {
    global::ensure_initialized()?;
    let parent = resolve_parent(parent)?;
    // SAFETY: Module initialized and parent validated just above.
    unsafe {
        let pool = slab::create(parent, object_size, callbacks, sync)?;
        Ok(PoolHandle::new(pool, (*pool).slice_tag))
    }
}

fn create_multi_pool(
    parent: Option<PoolHandle>,
    sizes: &[usize],
    callbacks: Option<Arc<dyn SliceCallbacks>>,
    sync: bool,
) -> PoolResult<PoolHandle> {
    global::ensure_initialized()?;
    let parent = resolve_parent(parent)?;
    // SAFETY: Module initialized and parent validated just above.
    unsafe {
        let primary = multi::create_multi(parent, sizes, callbacks, sync)?;
        Ok(PoolHandle::new(primary, (*primary).slice_tag))
    }
}

/// Map an optional parent handle to a pool pointer, rejecting stale ones.
fn resolve_parent(parent: Option<PoolHandle>) -> PoolResult<*mut slab::Pool> {
    match parent {
        None => Ok(core::ptr::null_mut()),
        Some(handle) if handle.is_valid() => Ok(handle.as_pool()),
        Some(handle) => Err(PoolError::stale_handle(handle.raw_tag())),
    }
}
