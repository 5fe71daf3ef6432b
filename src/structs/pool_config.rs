//! # **PoolConfig** - *Heap pool configuration parameters*

use crate::enums::error::PoolError;

/// Configuration for a [`HeapPool`](crate::HeapPool).
///
/// Controls the diagnostic name, the optional byte limit and the alignment
/// applied to every block. Validated when the pool is constructed; immutable after.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Name reported in logs and errors.
    pub name: String,

    /// Upper bound on bytes outstanding at any one time. `None` is unbounded.
    pub max_bytes: Option<usize>,

    /// Alignment of every block, in bytes.
    ///
    /// Default: 64, so owned buffers line up with SIMD kernels the same way
    /// `Vec64` does. Must be a power of two.
    pub alignment: usize,
}

impl PoolConfig {
    /// Default block alignment.
    pub const DEFAULT_ALIGNMENT: usize = 64;

    /// Create an unbounded config with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_bytes: None,
            alignment: Self::DEFAULT_ALIGNMENT,
        }
    }

    /// Sets the byte limit.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Sets the block alignment.
    #[must_use]
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Checks that the alignment is a non-zero power of two.
    pub fn validate(&self) -> Result<(), PoolError> {
        if !self.alignment.is_power_of_two() {
            return Err(PoolError::InvalidAlignment(self.alignment));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new("default")
    }
}
