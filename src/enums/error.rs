//! # Error Module - Custom *DataBuffer* Error Types
//!
//! Defines the error types raised by memory pools and buffers.
//!
//! ## Features
//! - `PoolError` covers allocator-side failures: exhausted byte limits, failed
//! system allocations and invalid layouts.
//! - `BufferError` covers every contract violation a `DataBuffer` can detect,
//! including wrapped pool failures.
//! - Both derive `thiserror::Error` for integration with standard Rust error handling.
//!
//! Buffer operations treat these as fatal: the infallible entry points panic with the
//! error's message, while `try_*` entry points hand the same value back to the caller.

use thiserror::Error;

/// Failures reported by a [`MemoryPool`](crate::MemoryPool).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The request would take the pool above its configured byte limit.
    #[error(
        "Pool '{pool}' capacity exceeded: requested {requested} bytes with {used} of {limit} bytes in use."
    )]
    CapacityExceeded {
        pool: String,
        requested: usize,
        used: usize,
        limit: usize,
    },
    /// The system allocator could not satisfy the request.
    #[error("Out of memory: allocation of {bytes} bytes failed.")]
    OutOfMemory { bytes: usize },
    /// Configured alignment is zero or not a power of two.
    #[error("Invalid alignment {0}: must be a non-zero power of two.")]
    InvalidAlignment(usize),
    /// Size and alignment do not form a valid layout.
    #[error("Invalid layout: {bytes} bytes at alignment {align}.")]
    InvalidLayout { bytes: usize, align: usize },
}

/// Contract violations detected by a [`DataBuffer`](crate::DataBuffer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Checked read past the logical size.
    #[error("Accessing index out of range: index {index}, size {len}.")]
    IndexOutOfRange { index: usize, len: usize },
    /// Growth requested on a buffer that aliases external memory.
    #[error("Can't reserve on a referenced buffer: requested {requested}, capacity {capacity}.")]
    ReferencedGrowth { requested: usize, capacity: usize },
    /// Write requested on a buffer that aliases external memory.
    #[error("Can't write through a referenced buffer.")]
    ReferencedWrite,
    /// Buffer-to-buffer append where the source lacks the requested range.
    #[error("Insufficient source data: source holds {available} elements, {requested} required.")]
    InsufficientSource { available: usize, requested: usize },
    /// The pool returned no memory for a positive-size request.
    #[error("Pool returned a null allocation for {bytes} bytes.")]
    NullAllocation { bytes: usize },
    /// Element count or byte size arithmetic overflowed.
    #[error("Capacity overflow: {elements} elements cannot be represented in bytes.")]
    CapacityOverflow { elements: usize },
    /// Growth requested on a buffer whose contents were moved out.
    #[error("Buffer has been moved out and has no storage to grow.")]
    Detached,
    /// Wrapped memory is not aligned for the element type.
    #[error("Referenced memory at {addr:#x} is not aligned to {align} bytes.")]
    Misaligned { addr: usize, align: usize },
    /// Pool alignment is weaker than the element type requires.
    #[error("Pool alignment {pool_align} is below the element alignment {align}.")]
    PoolAlignment { pool_align: usize, align: usize },
    #[error(transparent)]
    Pool(#[from] PoolError),
}
