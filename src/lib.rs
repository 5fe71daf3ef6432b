//! Copyright © 2025 Peter Garfield Bower. All rights reserved.
//!
//! # **databuffer** - *Pool-allocated growable buffers for columnar readers*
//!
//! A `DataBuffer<T>` is a contiguous, growable array of fixed-layout elements
//! whose storage either comes from an injected [`MemoryPool`] or aliases a
//! reference-counted [`SharedBuffer`] without copying.
//!
//! ## Modules
//! - [`structs::data_buffer`]: the buffer itself, its growth policies and modes
//! - [`structs::heap_pool`]: an accounted, aligned pool over the global allocator
//! - [`structs::shared_buffer`]: zero-copy reference-counted byte handles
//! - [`traits::memory_pool`]: the allocation capability buffers draw from
//!
//! ## Features
//! - `parallel_proc`: Rayon parallel iterators over buffer contents
//! - `size`: the [`ByteSize`] footprint estimator

pub mod enums {
    pub mod error;
}

pub mod structs {
    pub mod data_buffer;
    pub mod heap_pool;
    pub mod pool_config;
    pub mod shared_buffer;
}

pub mod traits {
    #[cfg(feature = "size")]
    pub mod byte_size;
    pub mod element;
    pub mod memory_pool;
    pub mod print;
}

pub(crate) mod macros;

pub use enums::error::{BufferError, PoolError};
pub use structs::data_buffer::{BufferMode, DataBuffer};
pub use structs::heap_pool::{HeapPool, PoolStats};
pub use structs::pool_config::PoolConfig;
pub use structs::shared_buffer::SharedBuffer;
#[cfg(feature = "size")]
pub use traits::byte_size::ByteSize;
pub use traits::element::Element;
pub use traits::memory_pool::{MemoryPool, PoolAlloc};
pub use traits::print::Print;
pub use vec64::Vec64;
