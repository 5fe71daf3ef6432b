//! # **DataBuffer** - *Pool-allocated, growable storage for fixed-layout elements*
//!
//! `DataBuffer<T>` is the storage primitive under decoded values, offsets and lengths
//! in columnar readers. It is a contiguous array whose memory either comes from an
//! injected [`MemoryPool`] or aliases a reference-counted [`SharedBuffer`].
//!
//! # Design
//! A buffer is built once into one of two modes and never changes mode:
//! - **Owned**: storage is allocated, reallocated and freed through the pool, which sees
//!   the exact byte size of every block for accounting.
//! - **Referenced**: storage aliases an external handle via [`DataBuffer::wrap`]. No
//!   allocation happens, `len == capacity`, and the buffer can neither grow nor be
//!   written through.
//!
//! There is no `Clone`. Ownership moves with ordinary Rust moves, or with
//! [`DataBuffer::take`] which leaves the source detached and empty.
//!
//! ## Growth
//! Every allocation funnels through [`DataBuffer::reserve`]. Two policies sit on top:
//! - **Exact** (`reserve`, `resize`, `append_at`): capacity becomes precisely what was asked.
//! - **Amortized** (`append`, `extend`, `extend_append`, `safe_set`): asks for
//!   `target + ceil(target / 2) + 1`, so repeated appends reallocate a logarithmic number
//!   of times.
//!
//! Reallocation carries forward the full previous capacity in bytes, not just the
//! logically used part.
//!
//! ## Failure
//! Contract violations (out-of-range `at`, growth or writes on a referenced buffer,
//! short source ranges, pool exhaustion) fail fast with a panic carrying a
//! [`BufferError`]. A failed operation leaves the buffer untouched.
//! `try_reserve` and `try_with_size` return the same errors for callers that handle them.
//!
//! ## Typical use
//! ```rust
//! use databuffer::{DataBuffer, HeapPool, SharedBuffer};
//!
//! let pool = HeapPool::default();
//! let mut offsets = DataBuffer::<i32>::new(&pool);
//! offsets.append(0);
//! offsets.append(3);
//! offsets.resize(4);
//! assert_eq!(offsets.as_slice(), &[0, 3, 0, 0]);
//!
//! // Hand the values to readers without copying again
//! let shared: SharedBuffer = offsets.to_shared();
//! let view = DataBuffer::<i32>::wrap(&shared);
//! assert_eq!(view.at(1), &3);
//! ```

use std::fmt::{self, Display, Formatter};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use tracing::{debug, warn};
use vec64::Vec64;

use crate::enums::error::BufferError;
use crate::macros::{check, ensure};
use crate::structs::shared_buffer::SharedBuffer;
use crate::traits::element::{Element, bytes_for};
use crate::traits::memory_pool::MemoryPool;
use crate::traits::print::write_preview;

/// Ownership mode of a [`DataBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferMode {
    /// Storage is allocated from and returned to a pool.
    Owned,
    /// Storage aliases a shared external handle.
    Referenced,
    /// Contents were moved out with [`DataBuffer::take`].
    Detached,
}

/// Internal memory provenance for `DataBuffer`
enum Storage<'p> {
    Owned(&'p dyn MemoryPool),
    Referenced(SharedBuffer),
    Detached,
}

/// Capacity requested by the amortized policy for a minimum of `target` elements.
#[inline]
pub(crate) fn amortized_capacity(target: usize) -> Result<usize, BufferError> {
    target
        .checked_add(target.div_ceil(2))
        .and_then(|n| n.checked_add(1))
        .ok_or(BufferError::CapacityOverflow { elements: target })
}

#[inline]
fn end_of(offset: usize, items: usize) -> Result<usize, BufferError> {
    offset
        .checked_add(items)
        .ok_or(BufferError::CapacityOverflow { elements: offset })
}

/// # DataBuffer
///
/// Growable, contiguous buffer of `T` backed by pool memory or by a shared handle.
///
/// ### Invariants
/// - `len <= capacity`
/// - storage pointer is absent exactly when `capacity == 0`
/// - owned blocks span `capacity * size_of::<T>()` bytes as far as the pool is concerned
/// - referenced buffers never grow and are never written through
///
/// ### Lifetimes
/// `'p` is the borrow of the pool. Referenced buffers hold no pool and are `'static`.
pub struct DataBuffer<'p, T: Element> {
    storage: Storage<'p>,
    data: Option<NonNull<T>>,
    len: usize,
    capacity: usize,
}

impl<'p, T: Element> DataBuffer<'p, T> {
    /// Constructs an empty owned buffer bound to `pool`. Does not allocate.
    #[inline]
    #[track_caller]
    pub fn new(pool: &'p dyn MemoryPool) -> Self {
        Self::with_size(pool, 0)
    }

    /// Constructs an owned buffer of `size` zeroed elements.
    ///
    /// Uses the pool's zero-filled allocation rather than allocating and clearing.
    #[track_caller]
    pub fn with_size(pool: &'p dyn MemoryPool, size: usize) -> Self {
        ensure(Self::try_with_size(pool, size))
    }

    /// Fallible form of [`DataBuffer::with_size`].
    pub fn try_with_size(pool: &'p dyn MemoryPool, size: usize) -> Result<Self, BufferError> {
        let align = align_of::<T>();
        if pool.alignment() < align {
            return Err(BufferError::PoolAlignment {
                pool_align: pool.alignment(),
                align,
            });
        }
        let bytes = bytes_for::<T>(size).ok_or(BufferError::CapacityOverflow { elements: size })?;
        let data = pool.allocate_zeroed(bytes)?;
        if bytes != 0 && data.is_none() {
            return Err(BufferError::NullAllocation { bytes });
        }
        debug_assert!(bytes != 0 || data.is_none(), "pool returned memory for a zero-byte request");
        Ok(Self {
            storage: Storage::Owned(pool),
            data: data.map(NonNull::cast),
            len: size,
            capacity: size,
        })
    }

    /// Constructs an owned buffer holding a copy of `src`, with exact capacity.
    #[track_caller]
    pub fn from_slice(pool: &'p dyn MemoryPool, src: &[T]) -> Self {
        let mut buf = Self::new(pool);
        buf.append_at(0, src);
        buf
    }

    /// Moves the contents out, leaving `self` detached with no storage.
    ///
    /// Dropping the detached source releases nothing, so pool accounting is
    /// unchanged by the transfer.
    #[inline]
    pub fn take(&mut self) -> Self {
        mem::replace(
            self,
            Self {
                storage: Storage::Detached,
                data: None,
                len: 0,
                capacity: 0,
            },
        )
    }

    /// Returns the number of valid elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer holds no valid elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of elements storage is reserved for.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the reserved storage in bytes.
    #[inline]
    pub fn capacity_in_bytes(&self) -> usize {
        self.capacity * size_of::<T>()
    }

    /// Returns the ownership mode.
    #[inline]
    pub fn mode(&self) -> BufferMode {
        match self.storage {
            Storage::Owned(_) => BufferMode::Owned,
            Storage::Referenced(_) => BufferMode::Referenced,
            Storage::Detached => BufferMode::Detached,
        }
    }

    /// Returns true if storage is allocated from a pool.
    #[inline]
    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    /// Returns true if the buffer aliases a shared external handle.
    #[inline]
    pub fn is_referenced(&self) -> bool {
        matches!(self.storage, Storage::Referenced(_))
    }

    /// The pool backing an owned buffer.
    #[inline]
    pub fn pool(&self) -> Option<&'p dyn MemoryPool> {
        match self.storage {
            Storage::Owned(pool) => Some(pool),
            _ => None,
        }
    }

    /// The handle aliased by a referenced buffer.
    #[inline]
    pub fn shared_handle(&self) -> Option<&SharedBuffer> {
        match &self.storage {
            Storage::Referenced(handle) => Some(handle),
            _ => None,
        }
    }

    /// Raw pointer to the first element, null when nothing is reserved.
    ///
    /// No bounds are enforced on accesses through it.
    #[inline]
    pub fn data(&self) -> *const T {
        self.data.map_or(ptr::null(), |p| p.as_ptr().cast_const())
    }

    /// Mutable raw pointer to the first element, null when nothing is reserved.
    ///
    /// Writing through it on a referenced buffer corrupts memory other holders see.
    #[inline]
    pub fn data_mut(&mut self) -> *mut T {
        self.data.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Returns the valid elements as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match self.data {
            // SAFETY: `len <= capacity` elements are initialised and live.
            Some(p) => unsafe { slice::from_raw_parts(p.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// Returns the valid elements as a mutable slice.
    ///
    /// Fails fast on a referenced buffer.
    #[inline]
    #[track_caller]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        ensure(self.writable());
        match self.data {
            // SAFETY: exclusive borrow of an owned block, `len` elements initialised.
            Some(p) => unsafe { slice::from_raw_parts_mut(p.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    /// Returns the valid elements as raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        let elems = self.as_slice();
        // SAFETY: `Element` types have no padding and every byte is initialised.
        unsafe { slice::from_raw_parts(elems.as_ptr().cast::<u8>(), mem::size_of_val(elems)) }
    }

    /// Element at `i` without any check.
    ///
    /// # Safety
    /// `i < capacity` and slot `i` must have been written (or zero-filled) before.
    #[inline]
    pub unsafe fn get_unchecked(&self, i: usize) -> &T {
        // SAFETY: forwarded caller contract.
        unsafe { &*self.data().add(i) }
    }

    /// Mutable element at `i` without any check.
    ///
    /// # Safety
    /// As [`DataBuffer::get_unchecked`], and the buffer must be owned.
    #[inline]
    pub unsafe fn get_unchecked_mut(&mut self, i: usize) -> &mut T {
        debug_assert!(!self.is_referenced());
        // SAFETY: forwarded caller contract.
        unsafe { &mut *self.data_mut().add(i) }
    }

    /// Checked read. Fails fast when `i >= len`.
    ///
    /// Get with range check on every call; prefer slice indexing or
    /// `get_unchecked` on hot paths where the bound is already established.
    #[inline]
    #[track_caller]
    pub fn at(&self, i: usize) -> &T {
        check!(i < self.len, BufferError::IndexOutOfRange { index: i, len: self.len });
        // SAFETY: i < len <= capacity.
        unsafe { self.get_unchecked(i) }
    }

    /// Checked read returning `None` when `i >= len`.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&T> {
        self.as_slice().get(i)
    }

    /// Ensures storage for at least `capacity` elements, exactly.
    ///
    /// No-op when `capacity <= self.capacity()`. Fails fast on a referenced or
    /// detached buffer asked to grow, and on pool failure.
    #[inline]
    #[track_caller]
    pub fn reserve(&mut self, capacity: usize) {
        ensure(self.try_reserve(capacity));
    }

    /// Fallible form of [`DataBuffer::reserve`].
    ///
    /// This is the only place storage is allocated or reallocated.
    pub fn try_reserve(&mut self, capacity: usize) -> Result<(), BufferError> {
        if capacity <= self.capacity {
            return Ok(());
        }
        let pool = match &self.storage {
            Storage::Owned(pool) => *pool,
            Storage::Referenced(_) => {
                return Err(BufferError::ReferencedGrowth {
                    requested: capacity,
                    capacity: self.capacity,
                });
            }
            Storage::Detached => return Err(BufferError::Detached),
        };
        let new_bytes =
            bytes_for::<T>(capacity).ok_or(BufferError::CapacityOverflow { elements: capacity })?;
        let old_bytes = self.capacity_in_bytes();
        let block = match self.data {
            None => pool.allocate(new_bytes)?,
            // SAFETY: the block came from `pool` and spans exactly `old_bytes`.
            Some(p) => unsafe { pool.reallocate(p.cast(), old_bytes, new_bytes)? },
        };
        let Some(block) = block else {
            return Err(BufferError::NullAllocation { bytes: new_bytes });
        };
        debug_assert_eq!(block.as_ptr() as usize % align_of::<T>(), 0);
        debug!(
            pool = pool.name(),
            old_capacity = self.capacity,
            new_capacity = capacity,
            old_bytes,
            new_bytes,
            "reserve"
        );
        self.data = Some(block.cast());
        self.capacity = capacity;
        Ok(())
    }

    /// Grows via the amortized policy applied to `base`, for a request needing `needed` slots.
    #[inline]
    #[track_caller]
    fn reserve_amortized(&mut self, base: usize, needed: usize) {
        let capacity = ensure(amortized_capacity(base));
        debug_assert!(capacity >= needed);
        debug!(base, needed, capacity, policy = "amortized", "grow");
        self.reserve(capacity);
    }

    #[inline]
    fn writable(&self) -> Result<(), BufferError> {
        match self.storage {
            Storage::Referenced(_) => Err(BufferError::ReferencedWrite),
            _ => Ok(()),
        }
    }

    /// Zero-fills `[len, offset)` when a write lands past the logical size.
    ///
    /// Requires `offset <= capacity` on a writable buffer.
    #[inline]
    fn zero_gap(&mut self, offset: usize) {
        if offset > self.len {
            // SAFETY: len < offset <= capacity, so the range is reserved storage.
            unsafe { ptr::write_bytes(self.data_mut().add(self.len), 0, offset - self.len) };
        }
    }

    /// Ensures capacity for `delta` more elements past `len`, via the amortized policy.
    ///
    /// Does not change `len`; pairs with the unchecked appends.
    #[inline]
    #[track_caller]
    pub fn extend(&mut self, delta: usize) {
        let target = ensure(end_of(self.len, delta));
        if target > self.capacity {
            self.reserve_amortized(target, target);
        }
    }

    /// Sets the logical size to `len`, growing exactly and zero-filling new elements.
    ///
    /// Shrinking keeps the capacity and leaves the tail untouched.
    #[track_caller]
    pub fn resize(&mut self, len: usize) {
        self.reserve(len);
        if len == self.len {
            return;
        }
        ensure(self.writable());
        self.zero_gap(len);
        self.len = len;
    }

    /// Appends one element, growing via the amortized policy when full.
    #[inline]
    #[track_caller]
    pub fn append(&mut self, value: T) {
        if self.len >= self.capacity {
            self.reserve_amortized(self.capacity, self.len + 1);
        }
        ensure(self.writable());
        // SAFETY: len < capacity after the reserve above.
        unsafe { self.append_unchecked(value) };
    }

    /// Appends one element without checking capacity.
    ///
    /// # Safety
    /// `len < capacity` and the buffer must be owned.
    #[inline]
    pub unsafe fn append_unchecked(&mut self, value: T) {
        debug_assert!(self.len < self.capacity && !self.is_referenced());
        // SAFETY: forwarded caller contract.
        unsafe { self.data_mut().add(self.len).write(value) };
        self.len += 1;
    }

    /// Appends `src` after the valid elements without checking capacity.
    ///
    /// # Safety
    /// `len + src.len() <= capacity` and the buffer must be owned.
    #[inline]
    pub unsafe fn append_slice_unchecked(&mut self, src: &[T]) {
        if src.is_empty() {
            return;
        }
        debug_assert!(self.len + src.len() <= self.capacity && !self.is_referenced());
        // SAFETY: forwarded caller contract; `src` cannot alias our exclusively borrowed block.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.data_mut().add(self.len), src.len()) };
        self.len += src.len();
    }

    /// Copies `src` to `offset` without checking capacity, then sets `len` to `offset + src.len()`.
    ///
    /// # Safety
    /// `offset + src.len() <= capacity`, the buffer must be owned, and when
    /// `offset > len` the slots in `[len, offset)` must already be initialised.
    #[inline]
    pub unsafe fn append_at_unchecked(&mut self, offset: usize, src: &[T]) {
        if !src.is_empty() {
            debug_assert!(offset + src.len() <= self.capacity && !self.is_referenced());
            // SAFETY: forwarded caller contract.
            unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.data_mut().add(offset), src.len()) };
        }
        self.len = offset + src.len();
    }

    /// Copies `src` to `offset`, growing via the amortized policy if needed.
    ///
    /// `len` becomes `offset + src.len()`; any gap past the old `len` is zero-filled.
    #[track_caller]
    pub fn extend_append(&mut self, offset: usize, src: &[T]) {
        let end = ensure(end_of(offset, src.len()));
        if end > self.capacity {
            self.reserve_amortized(end, end);
        }
        self.write_at(offset, src);
    }

    /// Copies `src` to `offset`, growing to exactly `offset + src.len()` if needed.
    ///
    /// `len` becomes `offset + src.len()`; any gap past the old `len` is zero-filled.
    #[track_caller]
    pub fn append_at(&mut self, offset: usize, src: &[T]) {
        let end = ensure(end_of(offset, src.len()));
        self.reserve(end);
        self.write_at(offset, src);
    }

    /// Copies `items` elements of `other` starting at `src_offset` to `offset`.
    ///
    /// Fails fast unless `other` holds at least `src_offset + items` valid elements.
    #[track_caller]
    pub fn append_from(&mut self, offset: usize, other: &DataBuffer<'_, T>, src_offset: usize, items: usize) {
        let needed = ensure(end_of(src_offset, items));
        check!(
            other.len() >= needed,
            BufferError::InsufficientSource {
                available: other.len(),
                requested: needed,
            }
        );
        self.append_at(offset, &other.as_slice()[src_offset..needed]);
    }

    #[inline]
    #[track_caller]
    fn write_at(&mut self, offset: usize, src: &[T]) {
        ensure(self.writable());
        self.zero_gap(offset);
        // SAFETY: capacity covers `offset + src.len()` and the gap is initialised.
        unsafe { self.append_at_unchecked(offset, src) };
    }

    /// Writes `value` at `offset`, growing via the amortized policy when `offset >= capacity`.
    ///
    /// Extends `len` to `offset + 1` when the write lands past it; the skipped
    /// elements read as zero.
    #[track_caller]
    pub fn safe_set(&mut self, offset: usize, value: T) {
        if offset >= self.capacity {
            // Increase capacity by 50% or to the offset, whichever is larger
            let size = ensure(amortized_capacity(self.capacity)).max(ensure(end_of(offset, 1)));
            debug!("reserve size: {size} for offset set: {offset}");
            self.reserve(size);
        }
        ensure(self.writable());
        if offset >= self.len {
            self.zero_gap(offset);
            self.len = offset + 1;
        }
        // SAFETY: offset < capacity on an owned buffer.
        unsafe { self.data_mut().add(offset).write(value) };
    }

    /// Releases owned storage back to the pool and resets `len` and `capacity` to zero.
    ///
    /// A referenced buffer only resets its bookkeeping; its handle stays held
    /// until the buffer is dropped.
    pub fn clear(&mut self) {
        let bytes = self.capacity_in_bytes();
        if let (Storage::Owned(pool), Some(p)) = (&self.storage, self.data) {
            // SAFETY: the block came from `pool` and spans exactly `bytes`.
            unsafe { pool.free(p.cast(), bytes) };
        }
        self.data = None;
        self.len = 0;
        self.capacity = 0;
    }

    /// Copies the valid elements into a 64-byte aligned `Vec64`.
    pub fn to_vec64(&self) -> Vec64<T> {
        let mut v = Vec64::with_capacity(self.len);
        v.extend_from_slice(self.as_slice());
        v
    }

    /// Copies the valid elements into a fresh, aligned shared handle.
    ///
    /// The result can be lent to readers through [`DataBuffer::wrap`].
    pub fn to_shared(&self) -> SharedBuffer {
        let bytes = self.as_bytes();
        let mut v = Vec64::with_capacity(bytes.len());
        v.extend_from_slice(bytes);
        SharedBuffer::from_vec64(v)
    }
}

impl<T: Element> DataBuffer<'static, T> {
    /// Constructs a referenced buffer aliasing `handle`'s bytes.
    ///
    /// `len == capacity == handle.len() / size_of::<T>()`. A trailing partial
    /// element is dropped with a warning. Fails fast when the bytes are not
    /// aligned for `T`. The buffer holds its own clone of the handle.
    #[track_caller]
    pub fn wrap(handle: &SharedBuffer) -> Self {
        let size = size_of::<T>();
        let len = handle.len() / size;
        let rem = handle.len() % size;
        if rem != 0 {
            warn!(
                bytes = handle.len(),
                element_size = size,
                dropped = rem,
                "wrap truncates trailing partial element"
            );
        }
        let addr = handle.as_ptr() as usize;
        let align = align_of::<T>();
        check!(len == 0 || addr % align == 0, BufferError::Misaligned { addr, align });
        let data = if len == 0 {
            None
        } else {
            NonNull::new(handle.as_ptr().cast_mut().cast::<T>())
        };
        Self {
            storage: Storage::Referenced(handle.clone()),
            data,
            len,
            capacity: len,
        }
    }
}

impl<T: Element> Drop for DataBuffer<'_, T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: Element> Deref for DataBuffer<'_, T> {
    type Target = [T];
    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Element> DerefMut for DataBuffer<'_, T> {
    // indexing via `&mut buf[0]` fails fast on referenced buffers
    #[inline]
    #[track_caller]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Element> AsRef<[T]> for DataBuffer<'_, T> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T: Element> IntoIterator for &'a DataBuffer<'_, T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<T: Element + PartialEq> PartialEq<DataBuffer<'_, T>> for DataBuffer<'_, T> {
    #[inline]
    fn eq(&self, other: &DataBuffer<'_, T>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Element + PartialEq> PartialEq<[T]> for DataBuffer<'_, T> {
    #[inline]
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: Element + fmt::Debug> fmt::Debug for DataBuffer<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBuffer")
            .field("mode", &self.mode())
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("data", &self.as_slice())
            .finish()
    }
}

impl<T: Element + Display> Display for DataBuffer<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = match self.mode() {
            BufferMode::Owned => "owned",
            BufferMode::Referenced => "referenced",
            BufferMode::Detached => "detached",
        };
        writeln!(f, "DataBuffer [{} elements, capacity {}] ({})", self.len, self.capacity, kind)?;
        write_preview(f, self.as_slice())
    }
}

#[cfg(feature = "parallel_proc")]
impl<T: Element + Send + Sync> DataBuffer<'_, T> {
    /// Parallel iterator over the valid elements.
    #[inline]
    pub fn par_iter(&self) -> rayon::slice::Iter<'_, T> {
        use rayon::iter::IntoParallelRefIterator;
        self.as_slice().par_iter()
    }

    /// Parallel mutable iterator over the valid elements. Fails fast on a referenced buffer.
    #[inline]
    #[track_caller]
    pub fn par_iter_mut(&mut self) -> rayon::slice::IterMut<'_, T> {
        use rayon::iter::IntoParallelRefMutIterator;
        self.as_mut_slice().par_iter_mut()
    }
}

// SAFETY: an owned block is exclusively held and the pool is `Sync`;
// a referenced block is read-only and its handle is `Send + Sync`.
unsafe impl<T: Element + Send> Send for DataBuffer<'_, T> {}
unsafe impl<T: Element + Sync> Sync for DataBuffer<'_, T> {}

#[cfg(test)]
mod tests {
    use std::io;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::ptr::NonNull;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::enums::error::PoolError;
    use crate::structs::heap_pool::HeapPool;
    use crate::structs::pool_config::PoolConfig;
    use crate::traits::memory_pool::PoolAlloc;

    /// Pool that breaks its contract by returning no memory for any request.
    #[derive(Debug)]
    struct NullPool;

    impl MemoryPool for NullPool {
        fn name(&self) -> &str {
            "null"
        }
        fn alignment(&self) -> usize {
            64
        }
        fn allocate(&self, _bytes: usize) -> PoolAlloc {
            Ok(None)
        }
        fn allocate_zeroed(&self, _bytes: usize) -> PoolAlloc {
            Ok(None)
        }
        unsafe fn reallocate(&self, _ptr: NonNull<u8>, _old: usize, _new: usize) -> PoolAlloc {
            Ok(None)
        }
        unsafe fn free(&self, _ptr: NonNull<u8>, _bytes: usize) {}
    }

    /// Log sink shared between the test and the subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn shared_i32(values: &[i32]) -> SharedBuffer {
        let mut v = Vec64::with_capacity(values.len() * 4);
        for x in values {
            v.extend_from_slice(&x.to_ne_bytes());
        }
        SharedBuffer::from_vec64(v)
    }

    #[test]
    fn test_new_is_empty() {
        let pool = HeapPool::default();
        let buf = DataBuffer::<u32>::new(&pool);
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 0);
        assert!(buf.data().is_null());
        assert_eq!(buf.mode(), BufferMode::Owned);
        assert_eq!(pool.used_bytes(), 0);
    }

    #[test]
    fn test_with_size_zero_filled() {
        let pool = HeapPool::default();
        let buf = DataBuffer::<i64>::with_size(&pool, 6);
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.capacity(), 6);
        assert!(buf.iter().all(|v| *v == 0));
        assert_eq!(pool.used_bytes(), 48);
        drop(buf);
        assert_eq!(pool.used_bytes(), 0);
    }

    #[test]
    fn test_append_amortized_growth() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::<u32>::new(&pool);
        let mut caps = Vec::new();
        for i in 0..10 {
            buf.append(i);
            caps.push(buf.capacity());
        }
        // 0 -> 1 -> 3 -> 6 -> 10
        assert_eq!(caps, vec![1, 3, 3, 6, 6, 6, 10, 10, 10, 10]);
        assert_eq!(buf.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(pool.used_bytes(), 40);
    }

    #[test]
    fn test_amortized_capacity() {
        assert_eq!(amortized_capacity(0), Ok(1));
        assert_eq!(amortized_capacity(1), Ok(3));
        assert_eq!(amortized_capacity(3), Ok(6));
        assert_eq!(amortized_capacity(10), Ok(16));
        assert_eq!(
            amortized_capacity(usize::MAX),
            Err(BufferError::CapacityOverflow { elements: usize::MAX })
        );
    }

    #[test]
    fn test_reserve_exact_and_monotonic() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::<u16>::new(&pool);
        buf.reserve(13);
        assert_eq!(buf.capacity(), 13);
        assert_eq!(buf.capacity_in_bytes(), 26);
        buf.reserve(5);
        assert_eq!(buf.capacity(), 13);
        assert_eq!(buf.len(), 0);
        assert_eq!(pool.used_bytes(), 26);
    }

    #[test]
    fn test_reserve_preserves_contents() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::from_slice(&pool, &[1.5f64, 2.5, 3.5]);
        assert_eq!(buf.capacity(), 3);
        buf.reserve(1000);
        assert_eq!(buf.as_slice(), &[1.5, 2.5, 3.5]);
        assert_eq!(pool.used_bytes(), 8000);
    }

    #[test]
    fn test_resize_grow_and_shrink() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::from_slice(&pool, &[4i32, 5, 6]);
        buf.resize(6);
        assert_eq!(buf.as_slice(), &[4, 5, 6, 0, 0, 0]);
        assert_eq!(buf.capacity(), 6);
        buf.resize(2);
        assert_eq!(buf.as_slice(), &[4, 5]);
        assert_eq!(buf.capacity(), 6);
        // Regrowing clears the slack that was abandoned by the shrink
        buf.resize(4);
        assert_eq!(buf.as_slice(), &[4, 5, 0, 0]);
    }

    #[test]
    fn test_extend_only_reserves() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::<u8>::new(&pool);
        buf.append(1);
        buf.extend(10);
        // target 11 -> 11 + 6 + 1
        assert_eq!(buf.capacity(), 18);
        assert_eq!(buf.len(), 1);
        unsafe { buf.append_slice_unchecked(&[2, 3, 4]) };
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
        buf.extend(2);
        assert_eq!(buf.capacity(), 18);
    }

    #[test]
    fn test_unchecked_appends() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::<i16>::new(&pool);
        buf.reserve(8);
        unsafe {
            buf.append_unchecked(1);
            buf.append_slice_unchecked(&[2, 3]);
            buf.append_slice_unchecked(&[]);
            buf.append_at_unchecked(1, &[9, 9]);
        }
        assert_eq!(buf.as_slice(), &[1, 9, 9]);
        unsafe { buf.append_at_unchecked(2, &[]) };
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_append_at_is_exact() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::<u64>::new(&pool);
        buf.append_at(0, &[1, 2, 3]);
        assert_eq!(buf.capacity(), 3);
        buf.append_at(3, &[4, 5]);
        assert_eq!(buf.capacity(), 5);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5]);
        // Overwrites and truncates to offset + items
        buf.append_at(1, &[7]);
        assert_eq!(buf.as_slice(), &[1, 7]);
        assert_eq!(buf.capacity(), 5);
    }

    #[test]
    fn test_append_at_past_len_zero_fills_gap() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::from_slice(&pool, &[1u32]);
        buf.append_at(4, &[5, 6]);
        assert_eq!(buf.as_slice(), &[1, 0, 0, 0, 5, 6]);
    }

    #[test]
    fn test_extend_append_is_amortized() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::<i32>::new(&pool);
        buf.extend_append(0, &[1, 2, 3, 4]);
        // target 4 -> 4 + 2 + 1
        assert_eq!(buf.capacity(), 7);
        buf.extend_append(4, &[5, 6, 7]);
        assert_eq!(buf.capacity(), 7);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_append_from_other_buffer() {
        let pool = HeapPool::default();
        let src = DataBuffer::from_slice(&pool, &[10u8, 20, 30, 40, 50]);
        let mut dst = DataBuffer::<u8>::new(&pool);
        dst.append_from(0, &src, 1, 3);
        assert_eq!(dst.as_slice(), &[20, 30, 40]);
        dst.append_from(3, &src, 0, 0);
        assert_eq!(dst.as_slice(), &[20, 30, 40]);
    }

    #[test]
    #[should_panic(expected = "Insufficient source data")]
    fn test_append_from_short_source() {
        let pool = HeapPool::default();
        let src = DataBuffer::from_slice(&pool, &[1u8, 2, 3]);
        let mut dst = DataBuffer::<u8>::new(&pool);
        dst.append_from(0, &src, 2, 2);
    }

    #[test]
    fn test_safe_set_within_and_beyond() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::from_slice(&pool, &[1i64, 2, 3]);
        buf.safe_set(1, 20);
        assert_eq!(buf.as_slice(), &[1, 20, 3]);
        buf.safe_set(7, 80);
        // max(8, 3 + 2 + 1)
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.len(), 8);
        assert_eq!(buf.at(7), &80);
        buf.safe_set(8, 90);
        // max(9, 8 + 4 + 1)
        assert_eq!(buf.capacity(), 13);
        assert_eq!(buf.len(), 9);
    }

    /// Runs `f` under a debug-level fmt subscriber and returns what it logged.
    fn capture_logs(f: impl FnOnce()) -> String {
        let sink = Captured::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, f);
        sink.contents()
    }

    #[test]
    fn test_safe_set_logs_growth() {
        let logs = capture_logs(|| {
            let pool = HeapPool::default();
            let mut buf = DataBuffer::<i32>::with_size(&pool, 5);
            buf.safe_set(10, 42);
        });
        assert!(logs.contains("reserve size: 11 for offset set: 10"));
        assert!(logs.contains("new_capacity=11"));
    }

    #[test]
    fn test_append_logs_needed_slots() {
        let logs = capture_logs(|| {
            let pool = HeapPool::default();
            let mut buf = DataBuffer::from_slice(&pool, &[1u32, 2, 3]);
            buf.append(4);
            assert_eq!(buf.capacity(), 6);
        });
        assert!(logs.contains("base=3"));
        assert!(logs.contains("needed=4"));
        assert!(logs.contains("capacity=6"));
    }

    #[test]
    #[should_panic(expected = "Accessing index out of range: index 3, size 3")]
    fn test_at_out_of_range() {
        let pool = HeapPool::default();
        let buf = DataBuffer::from_slice(&pool, &[1u8, 2, 3]);
        let _ = buf.at(3);
    }

    #[test]
    fn test_get_and_index() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::from_slice(&pool, &[1u8, 2, 3]);
        assert_eq!(buf.get(2), Some(&3));
        assert_eq!(buf.get(3), None);
        buf[0] = 9;
        assert_eq!(buf[0], 9);
        assert_eq!(unsafe { *buf.get_unchecked(1) }, 2);
        unsafe { *buf.get_unchecked_mut(2) = 7 };
        assert_eq!(buf.as_slice(), &[9, 2, 7]);
    }

    #[test]
    fn test_clear_releases_to_pool() {
        let pool = HeapPool::default();
        let mut buf = DataBuffer::from_slice(&pool, &[1u32, 2, 3, 4]);
        assert_eq!(pool.used_bytes(), 16);
        buf.clear();
        assert_eq!(pool.used_bytes(), 0);
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 0);
        assert!(buf.data().is_null());
        // still bound to the pool
        buf.append(5);
        assert_eq!(buf.as_slice(), &[5]);
        assert_eq!(pool.used_bytes(), 4);
    }

    #[test]
    fn test_take_transfers_ownership() {
        let pool = HeapPool::default();
        let mut src = DataBuffer::from_slice(&pool, &[3u32, 1, 4]);
        let data = src.data();
        let used = pool.used_bytes();

        let dst = src.take();
        assert_eq!(dst.data(), data);
        assert_eq!(dst.len(), 3);
        assert_eq!(dst.capacity(), 3);
        assert_eq!(src.len(), 0);
        assert_eq!(src.capacity(), 0);
        assert!(src.data().is_null());
        assert_eq!(src.mode(), BufferMode::Detached);
        assert!(src.pool().is_none());

        drop(src);
        assert_eq!(pool.used_bytes(), used);
        drop(dst);
        assert_eq!(pool.used_bytes(), 0);
    }

    #[test]
    #[should_panic(expected = "moved out")]
    fn test_detached_cannot_grow() {
        let pool = HeapPool::default();
        let mut src = DataBuffer::from_slice(&pool, &[1u8]);
        let _dst = src.take();
        src.append(2);
    }

    #[test]
    fn test_wrap_aliases_without_allocation() {
        let shared = shared_i32(&[7, 8, 9]);
        let buf = DataBuffer::<i32>::wrap(&shared);
        assert_eq!(buf.mode(), BufferMode::Referenced);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.capacity(), 3);
        assert_eq!(buf.data().cast::<u8>(), shared.as_ptr());
        assert_eq!(buf.as_slice(), &[7, 8, 9]);
        assert_eq!(shared.ref_count(), 2);
        drop(buf);
        assert_eq!(shared.ref_count(), 1);
    }

    #[test]
    fn test_wrap_truncates_partial_element() {
        let mut v = Vec64::with_capacity(10);
        v.extend_from_slice(&[1u8, 0, 0, 0, 2, 0, 0, 0, 3, 3]);
        let shared = SharedBuffer::from_vec64(v);
        let buf = DataBuffer::<u32>::wrap(&shared);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.capacity(), 2);
    }

    #[test]
    fn test_wrap_empty_handle() {
        let buf = DataBuffer::<f32>::wrap(&SharedBuffer::new());
        assert!(buf.is_empty());
        assert!(buf.data().is_null());
    }

    #[test]
    #[should_panic(expected = "is not aligned to 4 bytes")]
    fn test_wrap_misaligned() {
        let shared = shared_i32(&[1, 2]).slice(1..);
        let _ = DataBuffer::<i32>::wrap(&shared);
    }

    #[test]
    fn test_referenced_noop_growth_is_allowed() {
        let shared = shared_i32(&[1, 2, 3]);
        let mut buf = DataBuffer::<i32>::wrap(&shared);
        buf.reserve(3);
        buf.reserve(0);
        buf.extend(0);
        buf.resize(3);
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_referenced_rejects_growth_and_writes() {
        let shared = shared_i32(&[1, 2, 3]);
        let mut buf = DataBuffer::<i32>::wrap(&shared);

        assert_eq!(
            buf.try_reserve(4),
            Err(BufferError::ReferencedGrowth { requested: 4, capacity: 3 })
        );
        let grows = catch_unwind(AssertUnwindSafe(|| buf.append(4)));
        assert!(grows.is_err());
        let writes = catch_unwind(AssertUnwindSafe(|| buf.safe_set(0, 9)));
        assert!(writes.is_err());
        let shrinks = catch_unwind(AssertUnwindSafe(|| buf.resize(1)));
        assert!(shrinks.is_err());
        let derefs = catch_unwind(AssertUnwindSafe(|| buf[0] = 5));
        assert!(derefs.is_err());

        // nothing leaked through
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert_eq!(DataBuffer::<i32>::wrap(&shared).as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_referenced_clear_keeps_handle() {
        let shared = shared_i32(&[1, 2]);
        let mut buf = DataBuffer::<i32>::wrap(&shared);
        buf.clear();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 0);
        assert!(buf.is_referenced());
        assert_eq!(shared.ref_count(), 2);
    }

    #[test]
    fn test_pool_limit_is_fatal_or_reported() {
        let pool = HeapPool::new(PoolConfig::new("small").with_max_bytes(16)).unwrap();
        let mut buf = DataBuffer::<u32>::with_size(&pool, 4);
        let err = buf.try_reserve(5).unwrap_err();
        assert!(matches!(err, BufferError::Pool(PoolError::CapacityExceeded { .. })));
        // state unchanged after the failure
        assert_eq!(buf.capacity(), 4);
        assert_eq!(pool.used_bytes(), 16);

        let res = catch_unwind(AssertUnwindSafe(|| buf.append(1)));
        assert!(res.is_err());
        assert_eq!(buf.len(), 4);
        drop(buf);
        assert_eq!(pool.used_bytes(), 0);

        assert!(DataBuffer::<u32>::try_with_size(&pool, 5).is_err());
    }

    #[test]
    #[should_panic(expected = "null allocation for 8 bytes")]
    fn test_null_allocation_is_fatal() {
        let pool = NullPool;
        let _ = DataBuffer::<u64>::with_size(&pool, 1);
    }

    #[test]
    fn test_pool_alignment_checked() {
        let pool = HeapPool::new(PoolConfig::default().with_alignment(2)).unwrap();
        assert_eq!(
            DataBuffer::<u64>::try_with_size(&pool, 1).unwrap_err(),
            BufferError::PoolAlignment { pool_align: 2, align: align_of::<u64>() }
        );
        assert!(DataBuffer::<u16>::try_with_size(&pool, 1).is_ok());
    }

    #[test]
    fn test_to_shared_roundtrips_through_wrap() {
        let pool = HeapPool::default();
        let buf = DataBuffer::from_slice(&pool, &[1.0f32, -2.0, 3.5]);
        let shared = buf.to_shared();
        assert_eq!(shared.len(), 12);
        let view = DataBuffer::<f32>::wrap(&shared);
        assert_eq!(view, buf);
        assert_eq!(buf.to_vec64().as_slice(), &[1.0, -2.0, 3.5]);
    }

    #[test]
    fn test_equality_and_iteration() {
        let pool = HeapPool::default();
        let a = DataBuffer::from_slice(&pool, &[1i8, 2, 3]);
        let b = DataBuffer::from_slice(&pool, &[1i8, 2, 3]);
        assert_eq!(a, b);
        assert!(a == *[1i8, 2, 3].as_slice());
        let sum: i32 = (&a).into_iter().map(|v| i32::from(*v)).sum();
        assert_eq!(sum, 6);
    }

    #[test]
    fn test_debug_and_display() {
        let pool = HeapPool::default();
        let buf = DataBuffer::from_slice(&pool, &[1u8, 2, 3]);
        let dbg = format!("{buf:?}");
        assert!(dbg.contains("DataBuffer"));
        assert!(dbg.contains("Owned"));
        let shown = format!("{buf}");
        assert!(shown.contains("3 elements"));
        assert!(shown.contains("(owned)"));
        assert!(shown.ends_with("[1, 2, 3]"));

        let long = DataBuffer::<u8>::with_size(&pool, 60);
        assert!(format!("{long}").contains("… (60 total)"));
    }

    #[cfg(feature = "parallel_proc")]
    #[test]
    fn test_par_iter() {
        use rayon::prelude::*;
        let pool = HeapPool::default();
        let mut buf = DataBuffer::from_slice(&pool, &[1i32, 2, 3, 4, 5]);
        let sum: i32 = buf.par_iter().sum();
        assert_eq!(sum, 15);
        buf.par_iter_mut().for_each(|x| *x *= 2);
        assert_eq!(buf.as_slice(), &[2, 4, 6, 8, 10]);
    }
}
