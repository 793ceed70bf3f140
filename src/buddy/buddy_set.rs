//! Single-zone buddy system
//!
//! Implements the core buddy system for a single memory zone. Free lists are
//! kept per order inside the free blocks themselves.

use crate::{AllocError, AllocResult, MAX_SLAB_ORDER};

#[cfg(feature = "log")]
use log::{error, warn};

use super::{free_list::FreeBlockList, stats::ZoneInfo};

/// A buddy set implementation - represents a single zone
///
/// Every block, free or allocated, starts at an address that is a multiple
/// of its own size, which is what slab caches need from their page source.
pub struct BuddySet<const PAGE_SIZE: usize = { crate::DEFAULT_PAGE_SIZE }> {
    pub(crate) base_addr: usize,
    pub(crate) end_addr: usize,
    total_pages: usize,
    zone_id: usize,
    /// Free lists for each order
    free_lists: [FreeBlockList; MAX_SLAB_ORDER + 1],
}

impl<const PAGE_SIZE: usize> BuddySet<PAGE_SIZE> {
    /// Create a new buddy set for a zone (uninitialized, must call init())
    pub const fn new(base_addr: usize, size: usize, zone_id: usize) -> Self {
        Self {
            base_addr,
            end_addr: base_addr + size,
            total_pages: size / PAGE_SIZE,
            zone_id,
            free_lists: [const { FreeBlockList::new() }; MAX_SLAB_ORDER + 1],
        }
    }

    /// Create an empty buddy set
    pub const fn empty() -> Self {
        Self::new(0, 0, 0)
    }

    pub const fn max_order(&self) -> usize {
        MAX_SLAB_ORDER
    }

    const fn block_size(order: usize) -> usize {
        PAGE_SIZE << order
    }

    /// Check if an address belongs to this zone
    pub fn addr_in_zone(&self, addr: usize) -> bool {
        addr >= self.base_addr && addr < self.end_addr
    }

    /// Get zone information
    pub fn zone_info(&self) -> ZoneInfo {
        ZoneInfo {
            start_addr: self.base_addr,
            end_addr: self.end_addr,
            total_pages: self.total_pages,
            zone_id: self.zone_id,
        }
    }

    /// Initialize the buddy set with a memory region.
    ///
    /// The region is shrunk to whole pages and carved into the largest
    /// blocks that are aligned to their own size.
    pub fn init(&mut self, base_addr: usize, size: usize) {
        let aligned_base = crate::align_up(base_addr, PAGE_SIZE);
        let aligned_end = crate::align_down(base_addr + size, PAGE_SIZE);

        for list in &mut self.free_lists {
            list.clear();
        }

        if aligned_end <= aligned_base {
            error!(
                "zone {}: region [{:#x}, {:#x}) holds no whole page",
                self.zone_id,
                base_addr,
                base_addr + size
            );
            self.base_addr = aligned_base;
            self.end_addr = aligned_base;
            self.total_pages = 0;
            return;
        }

        self.base_addr = aligned_base;
        self.end_addr = aligned_end;
        self.total_pages = (aligned_end - aligned_base) / PAGE_SIZE;

        let mut addr = aligned_base;
        while addr < aligned_end {
            let mut order = MAX_SLAB_ORDER;
            while order > 0
                && (!crate::is_aligned(addr, Self::block_size(order))
                    || addr + Self::block_size(order) > aligned_end)
            {
                order -= 1;
            }
            self.free_lists[order].insert_sorted(addr);
            addr += Self::block_size(order);
        }
    }

    /// Allocate one block of the given order
    pub fn alloc_block(&mut self, order: usize) -> AllocResult<usize> {
        if order > self.max_order() {
            error!(
                "zone {}: order {} exceeds maximum order {}",
                self.zone_id,
                order,
                self.max_order()
            );
            return Err(AllocError::InvalidParam);
        }

        for found in order..=self.max_order() {
            let Some(addr) = self.free_lists[found].pop_front() else {
                continue;
            };

            // Split down to the requested order, returning upper halves
            let mut current = found;
            while current > order {
                current -= 1;
                self.free_lists[current].insert_sorted(addr + Self::block_size(current));
            }

            debug_assert!(crate::is_aligned(addr, Self::block_size(order)));
            return Ok(addr);
        }

        Err(AllocError::NoMemory)
    }

    /// Return a block to the buddy system with automatic merging
    pub fn dealloc_block(&mut self, addr: usize, order: usize) {
        if order > self.max_order() {
            error!(
                "zone {}: order {} exceeds maximum order {}",
                self.zone_id,
                order,
                self.max_order()
            );
            return;
        }

        let size = Self::block_size(order);
        if !self.addr_in_zone(addr) || addr + size > self.end_addr {
            error!(
                "zone {}: block [{:#x}, {:#x}) not in zone [{:#x}, {:#x})",
                self.zone_id,
                addr,
                addr + size,
                self.base_addr,
                self.end_addr
            );
            return;
        }

        if !crate::is_aligned(addr, size) {
            error!(
                "zone {}: block {:#x} is not aligned for order {}",
                self.zone_id, addr, order
            );
            return;
        }

        // Descendant check: part of the block is already free
        for i in 0..order {
            if self.free_lists[i].has_block_in_range(addr, addr + size) {
                warn!(
                    "zone {}: Double free (descendant) detected at order {} in range [{:#x}, {:#x})",
                    self.zone_id,
                    i,
                    addr,
                    addr + size
                );
                return;
            }
        }

        // Ancestor check: the block itself or a block containing it is free
        for i in order..=self.max_order() {
            let ancestor = crate::align_down(addr, Self::block_size(i));
            if self.free_lists[i].find_by_addr(ancestor).is_some() {
                warn!(
                    "zone {}: Double free detected at addr {:#x} (found at order {})",
                    self.zone_id, addr, i
                );
                return;
            }
        }

        let mut current_addr = addr;
        let mut current_order = order;
        while current_order < self.max_order() {
            let buddy_addr = current_addr ^ Self::block_size(current_order);
            if !self.addr_in_zone(buddy_addr) {
                break;
            }
            let Some(prev) = self.free_lists[current_order].find_by_addr(buddy_addr) else {
                break;
            };
            self.free_lists[current_order].remove_with_prev(buddy_addr, prev);
            current_addr &= buddy_addr;
            current_order += 1;
        }

        self.free_lists[current_order].insert_sorted(current_addr);
    }

    /// Get statistics for this zone
    #[cfg(feature = "tracking")]
    pub fn get_stats(&self) -> super::stats::BuddyStats {
        let mut stats = super::stats::BuddyStats::new();
        stats.total_pages = self.total_pages;

        for order in 0..=MAX_SLAB_ORDER {
            let block_count = self.free_lists[order].len();
            stats.free_blocks_by_order[order] = block_count;
            stats.free_pages += block_count << order;
        }

        stats.used_pages = stats.total_pages.saturating_sub(stats.free_pages);
        stats
    }

    /// Get the number of free blocks in a specific order
    pub fn get_order_block_count(&self, order: usize) -> usize {
        if order <= MAX_SLAB_ORDER {
            self.free_lists[order].len()
        } else {
            0
        }
    }

    /// Number of free pages across all orders
    pub fn free_pages(&self) -> usize {
        self.free_lists
            .iter()
            .enumerate()
            .map(|(order, list)| list.len() << order)
            .sum()
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }
}

impl Default for BuddySet {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::alloc::{alloc, dealloc};
    use core::alloc::Layout;

    const PAGE_SIZE: usize = 0x1000;
    const ZONE_SIZE: usize = PAGE_SIZE << (MAX_SLAB_ORDER + 1);

    fn with_zone(f: impl FnOnce(&mut BuddySet<PAGE_SIZE>, usize)) {
        let layout = Layout::from_size_align(ZONE_SIZE, PAGE_SIZE << MAX_SLAB_ORDER).unwrap();
        let base = unsafe { alloc(layout) } as usize;
        assert_ne!(base, 0);
        let mut zone = BuddySet::<PAGE_SIZE>::new(base, ZONE_SIZE, 0);
        zone.init(base, ZONE_SIZE);
        f(&mut zone, base);
        unsafe { dealloc(base as *mut u8, layout) };
    }

    #[test]
    fn test_init_carves_max_order_blocks() {
        with_zone(|zone, _| {
            assert_eq!(zone.total_pages(), ZONE_SIZE / PAGE_SIZE);
            assert_eq!(zone.get_order_block_count(MAX_SLAB_ORDER), 2);
            assert_eq!(zone.free_pages(), zone.total_pages());
        });
    }

    #[test]
    fn test_init_unaligned_region() {
        let size = 7 * PAGE_SIZE;
        let layout = Layout::from_size_align(size + PAGE_SIZE, PAGE_SIZE).unwrap();
        let raw = unsafe { alloc(layout) } as usize;
        assert_ne!(raw, 0);

        // Starting mid-page drops the partial pages at both ends.
        let mut zone = BuddySet::<PAGE_SIZE>::empty();
        zone.init(raw + 16, size);
        assert_eq!(zone.base_addr, raw + PAGE_SIZE);
        assert_eq!(zone.total_pages(), 6);
        assert_eq!(zone.free_pages(), 6);
        for order in 0..=MAX_SLAB_ORDER {
            for block in zone.free_lists[order].iter() {
                assert!(crate::is_aligned(block, PAGE_SIZE << order));
            }
        }

        unsafe { dealloc(raw as *mut u8, layout) };
    }

    #[test]
    fn test_split_and_merge() {
        with_zone(|zone, _| {
            let a = zone.alloc_block(0).unwrap();
            assert!(crate::is_aligned(a, PAGE_SIZE));
            // One max-order block got split all the way down.
            for order in 0..MAX_SLAB_ORDER {
                assert_eq!(zone.get_order_block_count(order), 1);
            }
            assert_eq!(zone.get_order_block_count(MAX_SLAB_ORDER), 1);

            zone.dealloc_block(a, 0);
            for order in 0..MAX_SLAB_ORDER {
                assert_eq!(zone.get_order_block_count(order), 0);
            }
            assert_eq!(zone.get_order_block_count(MAX_SLAB_ORDER), 2);
        });
    }

    #[test]
    fn test_blocks_aligned_to_their_size() {
        with_zone(|zone, _| {
            for order in [3, 0, 5, 1, 10] {
                let addr = zone.alloc_block(order).unwrap();
                assert!(crate::is_aligned(addr, PAGE_SIZE << order));
            }
        });
    }

    #[test]
    fn test_exhaustion() {
        with_zone(|zone, _| {
            let a = zone.alloc_block(MAX_SLAB_ORDER).unwrap();
            let b = zone.alloc_block(MAX_SLAB_ORDER).unwrap();
            assert_ne!(a, b);
            assert_eq!(zone.alloc_block(0), Err(AllocError::NoMemory));
            assert_eq!(zone.alloc_block(MAX_SLAB_ORDER + 1), Err(AllocError::InvalidParam));
            zone.dealloc_block(a, MAX_SLAB_ORDER);
            assert!(zone.alloc_block(0).is_ok());
        });
    }

    #[test]
    fn test_double_free_ignored() {
        with_zone(|zone, _| {
            let a = zone.alloc_block(2).unwrap();
            let b = zone.alloc_block(2).unwrap();
            zone.dealloc_block(a, 2);
            let free_before = zone.free_pages();

            zone.dealloc_block(a, 2);
            assert_eq!(zone.free_pages(), free_before);

            // A sub-block of a free block.
            zone.dealloc_block(a + PAGE_SIZE, 0);
            assert_eq!(zone.free_pages(), free_before);

            zone.dealloc_block(b, 2);
            assert_eq!(zone.free_pages(), zone.total_pages());
        });
    }

    #[test]
    fn test_invalid_dealloc_ignored() {
        with_zone(|zone, base| {
            let a = zone.alloc_block(1).unwrap();
            let free_before = zone.free_pages();
            // Misaligned for order 1.
            zone.dealloc_block(a + PAGE_SIZE, 1);
            // Outside the zone.
            zone.dealloc_block(base + ZONE_SIZE, 0);
            assert_eq!(zone.free_pages(), free_before);
            zone.dealloc_block(a, 1);
            assert_eq!(zone.free_pages(), zone.total_pages());
        });
    }
}
