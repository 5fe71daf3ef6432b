//! # **Internal module**
//!
//! Reference-counted, type-erased owner block backing non-static `SharedBuffer`s.
//!
//! The block is a `#[repr(C)]` header followed by the concrete owner, so a
//! `SharedBuffer` can hold a thin pointer to the header and still release the
//! right type through the stored `release` function.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared prefix of every owner block.
#[repr(C)]
pub(crate) struct Header {
    pub(crate) ref_cnt: AtomicUsize,
    release: unsafe fn(NonNull<Header>),
}

/// Header plus the concrete container keeping the bytes alive.
#[repr(C)]
pub(crate) struct Owned<O> {
    header: Header,
    pub(crate) owner: O,
}

/// Drops the owner block behind `header`.
unsafe fn release_owned<O>(header: NonNull<Header>) {
    // SAFETY: `header` was produced by `into_header::<O>` and this is the last reference.
    drop(unsafe { Box::from_raw(header.cast::<Owned<O>>().as_ptr()) });
}

/// Boxes `owner` with a reference count of one.
///
/// Returns the header pointer and a pointer to the owner, which stays at a
/// stable address until the block is released.
pub(crate) fn into_header<O: Send + Sync + 'static>(owner: O) -> (NonNull<Header>, NonNull<O>) {
    let block = Box::new(Owned {
        header: Header {
            ref_cnt: AtomicUsize::new(1),
            release: release_owned::<O>,
        },
        owner,
    });
    let raw = NonNull::from(Box::leak(block));
    // SAFETY: raw points to a live `Owned<O>`; `header` is its first field under `repr(C)`.
    let owner = unsafe { NonNull::new_unchecked(&raw mut (*raw.as_ptr()).owner) };
    (raw.cast::<Header>(), owner)
}

/// Adds a holder.
///
/// # Safety
/// `header` must point to a live owner block.
#[inline]
pub(crate) unsafe fn retain(header: NonNull<Header>) {
    // SAFETY: caller guarantees liveness.
    let ref_cnt = unsafe { &header.as_ref().ref_cnt };
    ref_cnt.fetch_add(1, Ordering::Relaxed);
}

/// Removes a holder, releasing the block when it was the last.
///
/// # Safety
/// `header` must point to a live owner block and the caller's hold must not be used again.
#[inline]
pub(crate) unsafe fn release(header: NonNull<Header>) {
    // SAFETY: caller guarantees liveness until the decrement below.
    let h = unsafe { header.as_ref() };
    if h.ref_cnt.fetch_sub(1, Ordering::AcqRel) == 1 {
        let release = h.release;
        // SAFETY: no other holder remains.
        unsafe { release(header) };
    }
}

/// Current number of holders.
///
/// # Safety
/// `header` must point to a live owner block.
#[inline]
pub(crate) unsafe fn holders(header: NonNull<Header>) -> usize {
    // SAFETY: caller guarantees liveness.
    unsafe { header.as_ref() }.ref_cnt.load(Ordering::Acquire)
}
