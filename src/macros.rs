//! # Macros - *Fail-fast contract checks and element registration*

use crate::enums::error::BufferError;

/// Aborts the current operation with `err`.
///
/// Contract violations are programmer errors, not runtime conditions, so
/// they surface as a panic carrying the error's message at the caller's site.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn fail(err: BufferError) -> ! {
    panic!("{err}")
}

/// Unwraps a buffer result, failing fast on error.
#[inline]
#[track_caller]
pub(crate) fn ensure<T>(res: Result<T, BufferError>) -> T {
    match res {
        Ok(v) => v,
        Err(err) => fail(err),
    }
}

/// Evaluates `cond` and fails fast with the given `BufferError` when it does not hold.
macro_rules! check {
    ($cond:expr, $err:expr) => {
        if !$cond {
            $crate::macros::fail($err);
        }
    };
}
pub(crate) use check;

/// Implements the `Element` marker for plain numeric types.
macro_rules! impl_element {
    ($($t:ty),* $(,)?) => {
        $(
            // SAFETY: primitive numerics are `Copy`, non-zero sized,
            // and valid for every bit pattern.
            unsafe impl $crate::traits::element::Element for $t {}
        )*
    };
}
pub(crate) use impl_element;
