//! Slab allocator implementation.
//!
//! This module implements a fixed-size object cache built from size-aligned
//! slabs with intrusive free lists and empty / active / full slab lists.

pub mod slab_cache;
pub(crate) mod slab_list;
pub(crate) mod slab_node;

// Re-export public types
pub use slab_cache::{CacheStats, SlabCache};
pub use slab_node::SlabState;
