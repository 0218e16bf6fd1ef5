//! Arbor Cache - shared key/value cache backends
//!
//! The folder-size layer only needs three byte-level operations from its
//! cache, described by [`SharedCache`]. [`MemoryCache`] is the in-process
//! backend: namespaced keys, a fixed eviction window, and a capacity bound.

pub mod memory;
pub mod traits;

pub use memory::{CacheStats, MemoryCache};
pub use traits::SharedCache;
