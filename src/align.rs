//! Cache-line alignment and small move/set helpers shared by the primitives
//! in this crate.
//!
//! Cache padding is [`crossbeam_utils::CachePadded`] re-exported under this
//! crate's own name rather than a second hand-rolled `#[repr(align(N))]`
//! wrapper — the dependency is already in the tree and solves exactly this
//! problem.

use std::mem::{self, MaybeUninit};
use std::ptr;

pub use crossbeam_utils::CachePadded;

/// Copies one `T` out of a slot without running its destructor or
/// constructing a reference to possibly-torn bytes.
///
/// # Safety
///
/// `src` must point to a fully initialized, valid `T` for the duration of
/// the call. Callers in [`crate::lfrb`] additionally re-validate a
/// sequencer after the copy to detect torn reads before trusting the
/// result — this function only performs the byte-wise move.
#[inline]
pub(crate) unsafe fn copy_slot<T>(src: *const MaybeUninit<T>) -> MaybeUninit<T> {
    let mut dst = MaybeUninit::<T>::uninit();
    ptr::copy_nonoverlapping(src.cast::<u8>(), dst.as_mut_ptr().cast::<u8>(), mem::size_of::<T>());
    dst
}

/// Zeroes a slot's backing bytes without requiring `T: Default`.
///
/// # Safety
///
/// `dst` must be valid for writes of `size_of::<T>()` bytes.
#[inline]
pub(crate) unsafe fn zero_slot<T>(dst: *mut MaybeUninit<T>) {
    ptr::write_bytes(dst.cast::<u8>(), 0, mem::size_of::<T>());
}
