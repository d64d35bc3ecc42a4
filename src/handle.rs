//! Tag-validated pool handles
//!
//! A handle is a `{pool pointer, tag}` pair. The tag is the generation
//! counter of the slice backing the pool's control block, captured at
//! creation. Validity is a two-level check: the pool's recorded tag and
//! the backing slice's live tag must both still equal the handle's tag.
//! Destroying a pool (or any ancestor) breaks both, so every outstanding
//! handle into the subtree goes stale without any bookkeeping of
//! outstanding handles.

use core::ptr::{self, NonNull};

use crate::error::{PoolError, PoolResult};
use crate::multi;
use crate::pool::slab::{self, PoolStats};
use crate::pool::slice::Slice;

/// Caller-side token for one pool.
///
/// Handles are plain copyable values; copying one does not extend the
/// pool's lifetime. A zero-initialized (default) handle is defined to be
/// invalid. All operations on a stale handle are no-ops that report
/// [`PoolError::StaleHandle`].
///
/// Handles to synchronized pools may be shared freely across threads.
/// Handles to unsynchronized pools require external serialization of every
/// operation, including `free` of their blocks. Handles must not be used
/// after [`finalize`](crate::finalize) tears the module down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHandle {
    pool: *mut slab::Pool,
    tag: i32,
}

// SAFETY: A handle is an address plus a token. Synchronized pools
// serialize internally on their mutex; for unsynchronized pools the
// documented external-serialization contract applies. Nothing in the
// handle itself is thread-affine.
unsafe impl Send for PoolHandle {}
// SAFETY: As above; &PoolHandle only exposes Copy reads of the pair.
unsafe impl Sync for PoolHandle {}

impl PoolHandle {
    /// The invalid handle; equal to a zero-initialized one.
    pub const INVALID: Self = Self {
        pool: ptr::null_mut(),
        tag: 0,
    };

    pub(crate) fn new(pool: *mut slab::Pool, tag: i32) -> Self {
        Self { pool, tag }
    }

    pub(crate) fn as_pool(&self) -> *mut slab::Pool {
        self.pool
    }

    pub(crate) fn raw_tag(&self) -> i32 {
        self.tag
    }

    /// Check whether the handle still refers to a live pool.
    ///
    /// Returns false for the zero handle and for any handle whose pool (or
    /// an ancestor of it) has been destroyed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.pool.is_null() {
            return false;
        }
        // SAFETY: Control blocks live in global-pool slices whose memory
        // stays mapped for the lifetime of the module, so reading the two
        // tags of a destroyed pool is still a read of owned memory; the
        // values then simply fail to match.
        unsafe {
            if (*self.pool).slice_tag != self.tag {
                return false;
            }
            let slice = Slice::from_payload(NonNull::new_unchecked(self.pool.cast::<u8>()));
            (*slice).tag == self.tag
        }
    }

    /// Allocate one block of the pool's object size.
    ///
    /// Fires the pool's `on_alloc` callback after the bookkeeping
    /// completes, while the pool lock is still held.
    pub fn alloc(&self) -> PoolResult<NonNull<u8>> {
        if !self.is_valid() {
            return Err(PoolError::stale_handle(self.tag));
        }
        // SAFETY: Validity checked above; the pool is live.
        unsafe { slab::alloc_slice(self.pool) }
    }

    /// Allocate `size` bytes through a multi-pool.
    ///
    /// Dispatches to the first ladder rung covering `size`, then to an
    /// existing overflow pool, and as a last resort synthesizes a new
    /// overflow pool of `size` rounded up to
    /// [`OVERRANGE_UNIT`](crate::OVERRANGE_UNIT) granularity. The returned
    /// block's [`block_size`](crate::block_size) is the bucket size, not
    /// the request.
    pub fn alloc_multi(&self, size: usize) -> PoolResult<NonNull<u8>> {
        if !self.is_valid() {
            return Err(PoolError::stale_handle(self.tag));
        }
        // SAFETY: Validity checked above; the primary is live.
        unsafe { multi::alloc_from_multi(self.pool, size) }
    }

    /// The pool's bucket size, if the handle is still valid.
    #[must_use]
    pub fn object_size(&self) -> Option<usize> {
        if !self.is_valid() {
            return None;
        }
        // SAFETY: Validity checked above.
        Some(unsafe { (*self.pool).layout.object_size })
    }

    /// Snapshot of the pool's counters, if the handle is still valid.
    #[must_use]
    pub fn stats(&self) -> Option<PoolStats> {
        if !self.is_valid() {
            return None;
        }
        // SAFETY: Validity checked above.
        Some(unsafe { slab::snapshot(self.pool) })
    }

    /// Destroy the pool and its whole subtree.
    ///
    /// Every handle into the subtree goes stale. For a multi-pool this
    /// destroys all ladder siblings and their overflow pools. A stale
    /// handle is a no-op.
    pub fn destroy(self) {
        if !self.is_valid() {
            return;
        }
        // SAFETY: Validity checked above; destroying a pool that still has
        // operations in flight is excluded by the handle contract.
        unsafe {
            if let Some(siblings) = (*self.pool).multi.take() {
                // Ladder members are siblings, not children: tear each down
                // from the shared parent in turn.
                for sibling in siblings {
                    slab::destroy_subtree(sibling.as_ptr(), true);
                }
            } else {
                slab::destroy_subtree(self.pool, true);
            }
        }
    }
}

impl Default for PoolHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_handle_is_invalid() {
        assert!(!PoolHandle::INVALID.is_valid());
        assert!(!PoolHandle::default().is_valid());
        assert_eq!(PoolHandle::default(), PoolHandle::INVALID);
    }

    #[test]
    fn stale_operations_are_rejected() {
        let handle = PoolHandle::INVALID;
        assert!(matches!(
            handle.alloc(),
            Err(PoolError::StaleHandle { tag: 0 })
        ));
        assert!(matches!(
            handle.alloc_multi(100),
            Err(PoolError::StaleHandle { tag: 0 })
        ));
        assert_eq!(handle.object_size(), None);
        assert_eq!(handle.stats(), None);
        handle.destroy(); // no-op
    }
}
