//! Interior mutability for the module's static pool state.
//!
//! `SyncUnsafeCell` wraps `UnsafeCell` and implements `Sync` so the global
//! pool and the global multi-pool handle can live in statics that are
//! mutated only during `init`/`finalize` (which serialize on the module
//! mutex) and otherwise accessed through per-pool locking.

use core::cell::UnsafeCell;

/// A wrapper around `UnsafeCell<T>` that implements `Sync`.
///
/// # Safety
///
/// The caller must ensure that access to the inner value is properly
/// synchronized. Within this crate that synchronization is the module
/// reference-count mutex (for init/finalize writes) and the per-pool mutex
/// (for everything reachable from the global pool).
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T: ?Sized>(UnsafeCell<T>);

// SAFETY: SyncUnsafeCell<T> is Sync if T is Send.
// - The wrapper adds no thread-local state over UnsafeCell
// - All mutation sites in this crate hold the module mutex or a pool mutex
// - T: Send ensures the value itself may be touched from any thread
unsafe impl<T: ?Sized + Send> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    /// Creates a new `SyncUnsafeCell` containing the given value.
    #[inline]
    pub(crate) const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }
}

impl<T: ?Sized> SyncUnsafeCell<T> {
    /// Gets a mutable pointer to the wrapped value.
    ///
    /// # Safety
    ///
    /// The caller must ensure that access through the returned pointer is
    /// synchronized and does not violate aliasing rules.
    #[inline]
    pub(crate) fn get(&self) -> *mut T {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_roundtrip() {
        let cell = SyncUnsafeCell::new(42_i32);
        // SAFETY: Exclusive access inside a single-threaded test.
        unsafe {
            assert_eq!(*cell.get(), 42);
            *cell.get() = 100;
            assert_eq!(*cell.get(), 100);
        }
    }

    #[test]
    fn cell_is_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<SyncUnsafeCell<i32>>();
    }
}
