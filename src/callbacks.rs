//! Allocation event callbacks
//!
//! A pool may carry a capability pair that observes every block the pool
//! hands out and takes back. Child pools synthesized by the multi-size
//! dispatcher inherit their overflow parent's callbacks.

use core::ptr::NonNull;

/// Observer for slice-level allocation events.
///
/// Both hooks run on the caller's thread **with the pool lock held**:
/// [`on_alloc`](Self::on_alloc) after the slice bookkeeping completes,
/// [`on_free`](Self::on_free) before the slice rejoins the free list.
/// During pool destruction `on_free` also fires once for every block still
/// live, so over a pool's lifetime the two hooks always balance.
///
/// Callbacks must not re-enter the pool that invoked them; doing so
/// deadlocks a synchronized pool and corrupts an unsynchronized one.
///
/// # Example
/// ```
/// use core::ptr::NonNull;
/// use core::sync::atomic::{AtomicUsize, Ordering};
/// use slabforest::SliceCallbacks;
///
/// #[derive(Default)]
/// struct Balance {
///     live: AtomicUsize,
/// }
///
/// impl SliceCallbacks for Balance {
///     fn on_alloc(&self, _payload: NonNull<u8>) {
///         self.live.fetch_add(1, Ordering::Relaxed);
///     }
///
///     fn on_free(&self, _payload: NonNull<u8>) {
///         self.live.fetch_sub(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait SliceCallbacks: Send + Sync {
    /// Called exactly once per successful allocation.
    fn on_alloc(&self, payload: NonNull<u8>) {
        let _ = payload;
    }

    /// Called exactly once per freed block, and once per still-live block
    /// when the owning pool is destroyed.
    fn on_free(&self, payload: NonNull<u8>) {
        let _ = payload;
    }
}
