//! # **HeapPool** - *Accounted, aligned pool over the global allocator*
//!
//! A [`MemoryPool`] that serves blocks from the process allocator at a fixed
//! alignment and tracks every byte it hands out.
//!
//! ## Accounting
//! - `used_bytes` rises on allocation and growth, falls on shrink and free.
//! - `peak_bytes` is the high-water mark of `used_bytes`.
//! - An optional byte limit rejects requests that would cross it, before any
//!   memory is touched.
//!
//! Counters are atomics, so a single pool may back buffers on many threads.
//!
//! ## Typical use
//! ```rust
//! use databuffer::{DataBuffer, HeapPool, PoolConfig};
//!
//! let pool = HeapPool::new(PoolConfig::new("decode").with_max_bytes(1 << 20)).unwrap();
//! let mut values = DataBuffer::<i64>::new(&pool);
//! values.append(42);
//! assert!(pool.used_bytes() >= 8);
//! drop(values);
//! assert_eq!(pool.used_bytes(), 0);
//! ```

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{trace, warn};

use crate::enums::error::PoolError;
use crate::structs::pool_config::PoolConfig;
use crate::traits::memory_pool::{MemoryPool, PoolAlloc};

/// Point-in-time copy of a pool's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub used_bytes: usize,
    pub peak_bytes: usize,
    pub live_allocations: usize,
    pub total_allocations: usize,
    pub total_frees: usize,
}

/// # HeapPool
///
/// Byte-accounted pool backed by the global allocator.
#[derive(Debug)]
pub struct HeapPool {
    config: PoolConfig,
    used: AtomicUsize,
    peak: AtomicUsize,
    live: AtomicUsize,
    allocations: AtomicUsize,
    frees: AtomicUsize,
}

impl HeapPool {
    /// Constructs a pool from a validated config.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    /// Zeroed counters around an already validated config.
    fn with_config(config: PoolConfig) -> Self {
        Self {
            config,
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
        }
    }

    /// Returns the pool's configuration.
    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Bytes currently outstanding.
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// High-water mark of outstanding bytes.
    #[inline]
    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    /// Snapshot of all counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            used_bytes: self.used_bytes(),
            peak_bytes: self.peak_bytes(),
            live_allocations: self.live.load(Ordering::Acquire),
            total_allocations: self.allocations.load(Ordering::Acquire),
            total_frees: self.frees.load(Ordering::Acquire),
        }
    }

    #[inline]
    fn layout(&self, bytes: usize) -> Result<Layout, PoolError> {
        Layout::from_size_align(bytes, self.config.alignment).map_err(|_| PoolError::InvalidLayout {
            bytes,
            align: self.config.alignment,
        })
    }

    /// Books `bytes` against the limit, failing without side effects if it would be crossed.
    fn charge(&self, bytes: usize) -> Result<(), PoolError> {
        let limit = self.config.max_bytes.unwrap_or(usize::MAX);
        let prev = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|next| *next <= limit)
            })
            .map_err(|used| {
                warn!(
                    pool = %self.config.name,
                    requested = bytes,
                    used,
                    limit,
                    "pool limit rejected request"
                );
                PoolError::CapacityExceeded {
                    pool: self.config.name.clone(),
                    requested: bytes,
                    used,
                    limit,
                }
            })?;
        self.peak.fetch_max(prev + bytes, Ordering::AcqRel);
        Ok(())
    }

    #[inline]
    fn uncharge(&self, bytes: usize) {
        let prev = self.used.fetch_sub(bytes, Ordering::AcqRel);
        debug_assert!(prev >= bytes, "pool '{}' released more than it handed out", self.config.name);
    }

    fn allocate_with(&self, bytes: usize, zeroed: bool) -> PoolAlloc {
        if bytes == 0 {
            return Ok(None);
        }
        let layout = self.layout(bytes)?;
        self.charge(bytes)?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe {
            if zeroed {
                alloc::alloc_zeroed(layout)
            } else {
                alloc::alloc(layout)
            }
        };
        let Some(ptr) = NonNull::new(raw) else {
            self.uncharge(bytes);
            return Err(PoolError::OutOfMemory { bytes });
        };
        self.live.fetch_add(1, Ordering::AcqRel);
        self.allocations.fetch_add(1, Ordering::AcqRel);
        trace!(pool = %self.config.name, bytes, zeroed, used = self.used_bytes(), "allocate");
        Ok(Some(ptr))
    }
}

impl Default for HeapPool {
    fn default() -> Self {
        Self::with_config(PoolConfig::default())
    }
}

impl MemoryPool for HeapPool {
    #[inline]
    fn name(&self) -> &str {
        &self.config.name
    }

    #[inline]
    fn alignment(&self) -> usize {
        self.config.alignment
    }

    fn allocate(&self, bytes: usize) -> PoolAlloc {
        self.allocate_with(bytes, false)
    }

    fn allocate_zeroed(&self, bytes: usize) -> PoolAlloc {
        self.allocate_with(bytes, true)
    }

    unsafe fn reallocate(&self, ptr: NonNull<u8>, old_bytes: usize, new_bytes: usize) -> PoolAlloc {
        if new_bytes == 0 {
            // SAFETY: forwarded caller contract.
            unsafe { self.free(ptr, old_bytes) };
            return Ok(None);
        }
        let old_layout = self.layout(old_bytes)?;
        self.layout(new_bytes)?;
        if new_bytes > old_bytes {
            self.charge(new_bytes - old_bytes)?;
        }
        // SAFETY: ptr was allocated by this pool with `old_layout`, and the new
        // size forms a valid layout at the same alignment.
        let raw = unsafe { alloc::realloc(ptr.as_ptr(), old_layout, new_bytes) };
        let Some(moved) = NonNull::new(raw) else {
            if new_bytes > old_bytes {
                self.uncharge(new_bytes - old_bytes);
            }
            return Err(PoolError::OutOfMemory { bytes: new_bytes });
        };
        if new_bytes < old_bytes {
            self.uncharge(old_bytes - new_bytes);
        }
        trace!(
            pool = %self.config.name,
            old_bytes,
            new_bytes,
            moved = moved != ptr,
            used = self.used_bytes(),
            "reallocate"
        );
        Ok(Some(moved))
    }

    unsafe fn free(&self, ptr: NonNull<u8>, bytes: usize) {
        if bytes == 0 {
            return;
        }
        // SAFETY: caller guarantees the block spans `bytes` at our alignment,
        // which formed a valid layout when it was handed out.
        unsafe {
            let layout = Layout::from_size_align_unchecked(bytes, self.config.alignment);
            alloc::dealloc(ptr.as_ptr(), layout);
        }
        self.uncharge(bytes);
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.frees.fetch_add(1, Ordering::AcqRel);
        trace!(pool = %self.config.name, bytes, used = self.used_bytes(), "free");
    }
}

impl Drop for HeapPool {
    fn drop(&mut self) {
        let used = *self.used.get_mut();
        if used != 0 {
            warn!(pool = %self.config.name, used, "pool dropped with bytes outstanding");
        }
    }
}
