//! # **MemoryPool Trait** - *Byte-accounted allocation capability*
//!
//! The arena a `DataBuffer` draws its owned storage from. Buffers hold a
//! non-owning reference to a pool and route every allocation, reallocation
//! and release through it, so the surrounding engine can account for and
//! limit memory per pool.
//!
//! ## Contract
//! - Every successful positive-size request returns `Some(ptr)` aligned to
//!   at least [`MemoryPool::alignment`].
//! - `None` is returned only for zero-byte requests.
//! - `free` and `reallocate` receive exactly the byte size the block was
//!   last allocated or reallocated with.

use std::fmt::Debug;
use std::ptr::NonNull;

use crate::enums::error::PoolError;

/// Result of a pool allocation. `Ok(None)` is only valid for zero bytes.
pub type PoolAlloc = Result<Option<NonNull<u8>>, PoolError>;

/// # MemoryPool
///
/// Allocator capability injected into owned `DataBuffer`s.
///
/// Implementations must be internally consistent when shared across threads,
/// since many buffers on different threads may draw from one pool.
pub trait MemoryPool: Debug + Send + Sync {
    /// Logical name used in diagnostics.
    fn name(&self) -> &str;

    /// Minimum alignment, in bytes, of every block handed out.
    fn alignment(&self) -> usize;

    /// Allocates `bytes` of uninitialised memory.
    fn allocate(&self, bytes: usize) -> PoolAlloc;

    /// Allocates `bytes` of zero-filled memory.
    fn allocate_zeroed(&self, bytes: usize) -> PoolAlloc;

    /// Grows or shrinks a block, preserving the first `min(old_bytes, new_bytes)` bytes.
    ///
    /// On error the original block is untouched and still owned by the caller.
    ///
    /// # Safety
    /// `ptr` must come from this pool and currently span exactly `old_bytes`.
    unsafe fn reallocate(&self, ptr: NonNull<u8>, old_bytes: usize, new_bytes: usize) -> PoolAlloc;

    /// Returns a block to the pool.
    ///
    /// # Safety
    /// `ptr` must come from this pool, span exactly `bytes`, and not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, bytes: usize);
}
