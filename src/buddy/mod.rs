//! Buddy page source module
//!
//! This module provides a buddy system that serves slab-sized blocks with:
//! - Size-aligned blocks of order `0..=MAX_SLAB_ORDER`
//! - Free lists kept inside the free blocks
//! - Multi-zone support
//! - Statistics and double-free detection

pub mod buddy_allocator;
pub mod buddy_set;
pub mod free_list;
pub mod stats;

pub use buddy_allocator::{BuddyPageSource, MAX_ZONES};
pub use buddy_set::BuddySet;
#[cfg(feature = "tracking")]
pub use stats::BuddyStats;
pub use stats::ZoneInfo;
