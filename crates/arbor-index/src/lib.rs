//! Arbor Index - tree store with cached folder sizes
//!
//! This crate provides:
//! - [`TreeStore`]: the async materialized-path tree store interface
//! - [`NodeStream`]: cancellable, ordered node listings
//! - [`MemoryTreeStore`]: an in-memory reference store
//! - [`FolderSizeCache`]: a [`TreeStore`] decorator that fills in folder
//!   sizes and keeps a shared cache of them consistent across mutations

pub mod folder_size;
pub mod memory;
pub mod store;
pub mod stream;

pub use folder_size::{cache_key, invalidation_keys, move_invalidation_keys, FolderSizeCache};
pub use memory::{root_mpath, MemoryTreeStore};
pub use store::TreeStore;
pub use stream::{NodeSink, NodeStream};
