//! Module state: the global pool, the global multi-pool and the
//! reference-counted init/finalize lifecycle.
//!
//! The global pool is the root of the pool forest. Its object size is
//! `size_of::<Pool>()`, so every other pool's control block is one of its
//! slices and creating a pool costs exactly one allocation.
//!
//! `init` and `finalize` serialize on the module mutex: nested `init`
//! calls only bump the reference count, and the 1 -> 0 `finalize`
//! transition tears down the whole forest. Callers must not race
//! `finalize` against in-flight pool operations.

use core::mem;
use core::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{PoolError, PoolResult};
use crate::handle::PoolHandle;
use crate::layout::SliceLayout;
use crate::multi::{self, DEFAULT_MULTI_SIZES};
use crate::pool::slab::{self, Pool};
use crate::sync_cell::SyncUnsafeCell;

#[cfg(feature = "logging")]
use tracing::{debug, info};

/// Total bytes currently held in nodes across the whole forest.
///
/// Read under pool locks, written from any pool, hence atomic.
pub(crate) static OCCUPATION: AtomicUsize = AtomicUsize::new(0);

/// Module reference count; also the init/finalize serialization point.
static MODULE_REFS: Mutex<u64> = Mutex::new(0);

/// The statically stored root of the forest.
static GLOBAL_POOL: SyncUnsafeCell<Pool> = SyncUnsafeCell::new(Pool::placeholder());

/// Handle to the default multi-pool, written only on init/finalize
/// transitions (which hold the module mutex).
static GLOBAL_MULTI: SyncUnsafeCell<PoolHandle> = SyncUnsafeCell::new(PoolHandle::INVALID);

/// Pointer to the global pool's control block.
#[inline]
pub(crate) fn global_pool() -> *mut Pool {
    GLOBAL_POOL.get()
}

/// Handle to the default multi-pool (invalid outside init/finalize).
#[inline]
pub(crate) fn global_multi() -> PoolHandle {
    // SAFETY: The handle is a plain Copy pair, written only during
    // init/finalize which callers must not race against pool operations.
    unsafe { *GLOBAL_MULTI.get() }
}

/// Total bytes currently held by the allocator across all pools.
///
/// Equals the sum of `node_size` over every live node; only the
/// auto-release rule and pool destruction ever make it shrink.
#[must_use]
pub fn occupation() -> usize {
    OCCUPATION.load(Ordering::Acquire)
}

/// Fail unless `init` has completed more often than `finalize`.
pub(crate) fn ensure_initialized() -> PoolResult<()> {
    if *MODULE_REFS.lock() == 0 {
        return Err(PoolError::not_initialized());
    }
    Ok(())
}

/// Initialize the module; see [`crate::init`].
pub(crate) fn init() -> PoolResult<()> {
    let mut refs = MODULE_REFS.lock();
    if *refs > 0 {
        *refs += 1;
        return Ok(());
    }

    #[cfg(feature = "logging")]
    debug!("initializing pool module");

    OCCUPATION.store(0, Ordering::Release);

    // SAFETY: refs == 0, so nothing can reach the global pool: we hold the
    // module mutex and every previously issued handle went stale at the
    // last finalize. Field-wise reset is safe because finalize leaves
    // `multi` and `callbacks` empty.
    unsafe {
        let root = global_pool();
        (*root).parent = ptr::null_mut();
        (*root).first_child = ptr::null_mut();
        (*root).prev = ptr::null_mut();
        (*root).next = ptr::null_mut();
        (*root).multi = None;
        (*root).layout = SliceLayout::for_object_size(mem::size_of::<Pool>());
        (*root).first_node = ptr::null_mut();
        (*root).newly_alloc_node = ptr::null_mut();
        (*root).first_free_slice = ptr::null_mut();
        (*root).first_occupied_slice = ptr::null_mut();
        (*root).callbacks = None;
        (*root).slice_tag = 0;
        (*root).sync = true;
    }

    // SAFETY: The root is now live; create_multi only touches it through
    // the normal (locked) allocation paths.
    let primary = unsafe { multi::create_multi(ptr::null_mut(), &DEFAULT_MULTI_SIZES, None, true) };
    match primary {
        Ok(primary) => {
            // SAFETY: Still holding the module mutex; writing the handle
            // cell cannot race reads because no handle is valid yet.
            unsafe {
                *GLOBAL_MULTI.get() = PoolHandle::new(primary, (*primary).slice_tag);
            }
        }
        Err(error) => {
            // Roll back whatever control-block nodes the attempt left in
            // the root so a later init starts from a clean forest.
            // SAFETY: Exclusive access as above.
            unsafe { slab::destroy_subtree(global_pool(), false) };
            return Err(error);
        }
    }

    *refs = 1;

    #[cfg(feature = "logging")]
    info!("pool module initialized");

    Ok(())
}

/// Finalize the module; see [`crate::finalize`].
pub(crate) fn finalize() {
    let mut refs = MODULE_REFS.lock();
    match *refs {
        0 => {}
        1 => {
            *refs = 0;

            #[cfg(feature = "logging")]
            debug!("finalizing pool module, destroying forest");

            // SAFETY: Reference count just hit zero under the module mutex;
            // the caller contract forbids racing pool operations, so the
            // forest is exclusively ours. Destroying the root recursively
            // destroys every surviving pool, global multi-pool included.
            unsafe {
                *GLOBAL_MULTI.get() = PoolHandle::INVALID;
                slab::destroy_subtree(global_pool(), false);
            }
        }
        _ => *refs -= 1,
    }
}
