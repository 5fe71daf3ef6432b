//! # **Element Trait** - *Types storable in a `DataBuffer`*
//!
//! Buffers copy, zero-fill and alias their contents as raw bytes, so the element
//! universe is restricted to fixed-layout numerics for which that is exact.

use crate::macros::impl_element;

/// Trait for types valid as elements of a [`DataBuffer`](crate::DataBuffer).
///
/// Useful when specifying `my_fn::<T: Element>() {}`.
///
/// # Safety
/// Implementors must guarantee that:
/// - The type is `Copy` with no drop glue, so byte-wise copies are exact.
/// - `size_of::<Self>() > 0`.
/// - Every bit pattern is a valid value. Zero-filled extension relies on the
///   all-zero pattern, and wrapped external bytes may hold anything.
pub unsafe trait Element: Copy + 'static {}

impl_element!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

/// Byte size of `items` elements of `T`, or `None` on overflow.
#[inline]
pub(crate) const fn bytes_for<T: Element>(items: usize) -> Option<usize> {
    items.checked_mul(size_of::<T>())
}
