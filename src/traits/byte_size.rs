//! # **ByteSize Trait** - *Estimate Memory Footprint*
//!
//! Provides memory size estimation for buffers and shared handles.
//!
//! ## Purpose
//! - Returns the byte size a value holds on the heap
//! - Useful for memory tracking and allocation planning alongside pool accounting
//!
//! ## Usage
//! ```rust
//! use databuffer::{ByteSize, DataBuffer, HeapPool};
//!
//! let pool = HeapPool::default();
//! let buf = DataBuffer::<i64>::with_size(&pool, 5);
//! assert_eq!(buf.est_bytes(), 40);
//! ```

use std::mem::size_of;

use vec64::Vec64;

use crate::structs::data_buffer::DataBuffer;
use crate::structs::shared_buffer::SharedBuffer;
use crate::traits::element::Element;

/// Trait for estimating the memory footprint of a type.
///
/// Does not include:
/// - Stack size of the struct itself (only heap allocations)
/// - Memory aliased from a shared handle, which is counted by whoever owns it
pub trait ByteSize {
    /// Returns the estimated byte size of this object in memory.
    fn est_bytes(&self) -> usize;
}

/// ByteSize for Vec64<T> - 64-byte aligned vector
impl<T> ByteSize for Vec64<T> {
    #[inline]
    fn est_bytes(&self) -> usize {
        self.capacity() * size_of::<T>()
    }
}

/// Owned buffers report the capacity charged to their pool; referenced ones report zero.
impl<T: Element> ByteSize for DataBuffer<'_, T> {
    #[inline]
    fn est_bytes(&self) -> usize {
        if self.is_owned() { self.capacity_in_bytes() } else { 0 }
    }
}

impl ByteSize for SharedBuffer {
    #[inline]
    fn est_bytes(&self) -> usize {
        self.len()
    }
}
