//! # **SharedBuffer Module** - Backs *DataBuffer* in referenced mode
//!
//! Zero-copy, reference-counted, read-only byte buffer.
//!
//! This is the handle through which memory owned elsewhere (decoded pages,
//! memory-mapped files, network frames) is lent to `DataBuffer::wrap` without copying.

use std::fmt;
use std::ops::{Bound, Deref, RangeBounds};
use std::ptr::NonNull;
use std::slice;

use vec64::Vec64;

use crate::structs::shared_buffer::internal::owned::{self, Header};

mod internal {
    pub(crate) mod owned;
}

/// Keeps a `Vec64<u8>` alive behind an `AsRef<[u8]>` interface.
struct Aligned(Vec64<u8>);

impl AsRef<[u8]> for Aligned {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// # SharedBuffer
///
/// Zero-copy, reference-counted byte buffer.
///
/// ## Purpose
/// Lets several readers alias one externally owned allocation. Every clone
/// shares the same bytes; the allocation is released when the last holder drops,
/// so releasing one holder never invalidates the others.
///
/// ## Features
/// - O(1) cloning and slicing
/// - Backends: `Vec<u8>`, 64-byte aligned `Vec64<u8>`, any `AsRef<[u8]>` owner, static slices
///
/// ## Usage
/// ```rust
/// use databuffer::SharedBuffer;
/// let sb = SharedBuffer::from_vec(vec![1, 2, 3, 4, 5]);
/// let head = sb.slice(0..2);         // Zero-copy slice
/// assert_eq!(head.as_slice(), &[1, 2]);
/// assert_eq!(sb.ref_count(), 2);
/// ```
pub struct SharedBuffer {
    ptr: *const u8,
    len: usize,
    // None for static data
    header: Option<NonNull<Header>>,
}

impl SharedBuffer {
    /// Constructs a new, empty `SharedBuffer`
    pub const fn new() -> Self {
        const EMPTY: &[u8] = &[];
        Self::from_static(EMPTY)
    }

    /// Constructs a `SharedBuffer` from a static slice
    pub const fn from_static(s: &'static [u8]) -> Self {
        Self {
            ptr: s.as_ptr(),
            len: s.len(),
            header: None,
        }
    }

    /// Constructs a `SharedBuffer` that takes ownership of `v`.
    pub fn from_vec(v: Vec<u8>) -> Self {
        Self::from_owner(v)
    }

    /// Constructs a `SharedBuffer` from a SIMD-aligned `Vec64<u8>`.
    pub fn from_vec64(v: Vec64<u8>) -> Self {
        Self::from_owner(Aligned(v))
    }

    /// Constructs a `SharedBuffer` from an arbitrary owner (e.g. `Arc<[u8]>`, mmap, etc).
    ///
    /// The owner must implement `AsRef<[u8]> + Send + Sync + 'static`, and
    /// must return the same bytes for as long as it lives.
    pub fn from_owner<O>(owner: O) -> Self
    where
        O: AsRef<[u8]> + Send + Sync + 'static,
    {
        let (header, owner) = owned::into_header(owner);
        // SAFETY: the owner block is live and pinned on the heap until released.
        let bytes = unsafe { owner.as_ref() }.as_ref();
        Self {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
            header: Some(header),
        }
    }

    /// Returns the number of bytes in this buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if this buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a read-only view of the data as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe bytes kept alive by `header` (or static).
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Returns a pointer to the first byte.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Returns a zero-copy slice of this buffer's data.
    ///
    /// Panics if range is out of bounds.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let start = match range.start_bound() {
            Bound::Unbounded => Some(0),
            Bound::Included(&n) => Some(n),
            Bound::Excluded(&n) => n.checked_add(1),
        };
        let end = match range.end_bound() {
            Bound::Unbounded => Some(self.len),
            Bound::Included(&n) => n.checked_add(1),
            Bound::Excluded(&n) => Some(n),
        };
        let (start, end) = match (start, end) {
            (Some(start), Some(end)) if start <= end && end <= self.len => (start, end),
            _ => panic!(
                "SharedBuffer::slice: range {:?}..{:?} out of bounds for length {}",
                range.start_bound(),
                range.end_bound(),
                self.len
            ),
        };
        let mut s = self.clone();
        // SAFETY: start <= len, so the offset stays within (or one past) the allocation.
        s.ptr = unsafe { s.ptr.add(start) };
        s.len = end - start;
        s
    }

    /// Returns the number of live handles sharing the underlying storage.
    ///
    /// Static buffers are untracked and always report 1.
    #[inline]
    pub fn ref_count(&self) -> usize {
        match self.header {
            // SAFETY: we hold one of the references.
            Some(h) => unsafe { owned::holders(h) },
            None => 1,
        }
    }

    /// Returns `true` if this buffer is the unique holder of its underlying storage.
    ///
    /// For static buffers this is always `true`, as the memory is never deallocated.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.ref_count() == 1
    }
}

impl Clone for SharedBuffer {
    /// Clones this buffer. Always O(1), increases refcount if needed.
    fn clone(&self) -> Self {
        if let Some(h) = self.header {
            // SAFETY: self holds a reference, so the block is live.
            unsafe { owned::retain(h) };
        }
        Self {
            ptr: self.ptr,
            len: self.len,
            header: self.header,
        }
    }
}

impl Drop for SharedBuffer {
    /// Drops this buffer, decrementing the reference count and releasing memory if unique.
    fn drop(&mut self) {
        if let Some(h) = self.header.take() {
            // SAFETY: this is our reference and it is not used again.
            unsafe { owned::release(h) };
        }
    }
}

impl Default for SharedBuffer {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Compare for equality (byte-wise).
impl PartialEq for SharedBuffer {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}
impl Eq for SharedBuffer {}

impl PartialEq<[u8]> for SharedBuffer {
    #[inline]
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedBuffer").field(&self.as_slice()).finish()
    }
}

/// Deref to [u8] for zero-copy APIs.
impl Deref for SharedBuffer {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for SharedBuffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for SharedBuffer {
    #[inline]
    fn from(v: Vec<u8>) -> Self {
        Self::from_vec(v)
    }
}

impl From<Vec64<u8>> for SharedBuffer {
    #[inline]
    fn from(v: Vec64<u8>) -> Self {
        Self::from_vec64(v)
    }
}

impl From<&'static [u8]> for SharedBuffer {
    #[inline]
    fn from(s: &'static [u8]) -> Self {
        Self::from_static(s)
    }
}

// SAFETY: the bytes are immutable and the owner is `Send + Sync`;
// the reference count is atomic.
unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}
