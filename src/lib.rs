//! Slab object cache
//!
//! This crate implements a fixed-size object allocator in the classic slab
//! style, featuring:
//! - Per-object-size cache geometry (slab order and capacity)
//! - Intrusive free lists stored inside the slabs themselves
//! - Empty / active / full slab lists with O(1) transitions
//! - Owner lookup by masking an object address down to its slab
//! - Pluggable page sources (buddy system or global allocator)

#![no_std]

extern crate alloc;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// Default page size for page sources
pub const DEFAULT_PAGE_SIZE: usize = 0x1000;

/// Largest slab order a page source has to serve (`PAGE_SIZE << 10`, 4 MiB
/// with 4 KiB pages).
pub const MAX_SLAB_ORDER: usize = 10;

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Invalid size, order or region. (e.g. zero object size)
    InvalidParam,
    /// Memory added by `add_memory` overlapped with existed memory.
    MemoryOverlap,
    /// No enough memory to allocate.
    NoMemory,
}

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidParam => write!(f, "invalid parameter"),
            Self::MemoryOverlap => write!(f, "memory region overlaps an existing one"),
            Self::NoMemory => write!(f, "out of memory"),
        }
    }
}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// The base allocator inherited by allocators that manage raw memory regions.
pub trait BaseAllocator {
    /// Initialize the allocator with a free memory region.
    fn init(&mut self, start: usize, size: usize);

    /// Add a free memory region to the allocator.
    fn add_memory(&mut self, start: usize, size: usize) -> AllocResult;
}

/// Source of the page blocks slabs are carved from.
///
/// A block of order `n` is `PAGE_SIZE << n` bytes long and its address must
/// be a multiple of its own size. Slab caches rely on that alignment to find
/// the slab owning an object, so an implementation that cannot honour it must
/// not implement this trait.
pub trait PageSource {
    /// The size of a memory page.
    const PAGE_SIZE: usize;

    /// Allocate one block of `PAGE_SIZE << order` bytes, aligned to its size.
    ///
    /// `order` is in `0..=MAX_SLAB_ORDER`.
    fn alloc_block(&mut self, order: usize) -> AllocResult<usize>;

    /// Return a block previously obtained from [`PageSource::alloc_block`]
    /// with the same `order`.
    fn free_block(&mut self, addr: usize, order: usize);
}

impl<S: PageSource + ?Sized> PageSource for &mut S {
    const PAGE_SIZE: usize = S::PAGE_SIZE;

    fn alloc_block(&mut self, order: usize) -> AllocResult<usize> {
        (**self).alloc_block(order)
    }

    fn free_block(&mut self, addr: usize, order: usize) {
        (**self).free_block(addr, order)
    }
}

#[inline]
const fn align_down(pos: usize, align: usize) -> usize {
    pos & !(align - 1)
}

#[inline]
const fn align_up(pos: usize, align: usize) -> usize {
    (pos + align - 1) & !(align - 1)
}

/// Checks whether the address has the demanded alignment.
///
/// Equivalent to `addr % align == 0`, but the alignment must be a power of two.
#[inline]
const fn is_aligned(base_addr: usize, align: usize) -> bool {
    base_addr & (align - 1) == 0
}

pub mod geometry;
pub use geometry::{CacheGeometry, MIN_SLAB_OBJECTS};

pub mod buddy;
#[cfg(feature = "tracking")]
pub use buddy::BuddyStats;
pub use buddy::{BuddyPageSource, MAX_ZONES};

pub mod page_source;
pub use page_source::SystemPageSource;

pub mod slab;
pub use slab::{CacheStats, SlabCache, SlabState};

pub mod locked_cache;
pub use locked_cache::LockedSlabCache;
