//! Intrusive slice headers
//!
//! Every block a pool hands out is preceded by a `Slice` header at a fixed
//! negative offset, which is how `free` and `block_size` recover the owning
//! node and pool from a bare payload pointer.
//!
//! # Safety
//!
//! The `prev`/`next` links are dual-use: they thread either the pool-wide
//! free list (together with the owning node's contiguous sublist bounds) or
//! the pool-wide in-use list, depending on the slice's state. A slice is a
//! member of exactly one of those lists at any instant, or of neither while
//! it still sits in its node's never-carved bump region.

use core::ptr::NonNull;

use crate::layout::{SLICE_ALIGN, SLICE_HEADER_SIZE};
use crate::pool::node::Node;

/// Header preceding every payload.
///
/// `tag` is the generation counter: stamped 1 when the slice is first
/// carved, then incremented on every allocation and every free, so each
/// alloc/free cycle advances it by two and an odd tag always means "handed
/// out". Handles to pool control blocks capture this tag for staleness
/// detection.
#[repr(C)]
pub(crate) struct Slice {
    pub(crate) prev: *mut Slice,
    pub(crate) next: *mut Slice,
    pub(crate) node: *mut Node,
    pub(crate) tag: i32,
}

const _: () = assert!(core::mem::align_of::<Slice>() <= SLICE_ALIGN);

impl Slice {
    /// Payload pointer for a slice header.
    ///
    /// # Safety
    ///
    /// `slice` must point to a live slice header inside a node, with at
    /// least the pool's payload region following it.
    #[inline]
    pub(crate) unsafe fn payload(slice: *mut Slice) -> NonNull<u8> {
        // SAFETY: The payload starts SLICE_HEADER_SIZE bytes after the
        // header, inside the same node allocation; the result is derived
        // from a non-null header pointer and cannot wrap.
        unsafe { NonNull::new_unchecked(slice.cast::<u8>().add(SLICE_HEADER_SIZE)) }
    }

    /// Recover the slice header from a payload pointer.
    ///
    /// # Safety
    ///
    /// `payload` must have been produced by [`Slice::payload`] (i.e. come
    /// from a pool allocation); anything else reads unrelated memory.
    #[inline]
    pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> *mut Slice {
        // SAFETY: Inverse of `payload`; the header lives SLICE_HEADER_SIZE
        // bytes before the payload within the same allocation.
        unsafe { payload.as_ptr().sub(SLICE_HEADER_SIZE).cast::<Slice>() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::align_up;

    #[test]
    fn header_offset_matches_layout() {
        assert_eq!(
            SLICE_HEADER_SIZE,
            align_up(core::mem::size_of::<Slice>(), SLICE_ALIGN)
        );
    }

    #[test]
    fn payload_roundtrip() {
        let mut backing = [0u8; 128];
        let slice = backing.as_mut_ptr().cast::<Slice>();
        // SAFETY: `backing` is large enough for a header plus payload and
        // lives for the whole test.
        unsafe {
            let payload = Slice::payload(slice);
            assert_eq!(
                payload.as_ptr() as usize - slice as usize,
                SLICE_HEADER_SIZE
            );
            assert_eq!(Slice::from_payload(payload), slice);
        }
    }
}
