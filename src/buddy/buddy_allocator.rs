//! Multi-zone buddy page source
//!
//! Serves size-aligned slab blocks out of one or more caller-provided memory
//! regions.

use crate::{AllocError, AllocResult, BaseAllocator, PageSource};

#[cfg(feature = "log")]
use log::{debug, error, info, warn};

use super::buddy_set::BuddySet;
#[cfg(feature = "tracking")]
use super::stats::{BuddyStats, MemoryStatsReporter};

/// Maximum number of memory zones supported
pub const MAX_ZONES: usize = 8;

/// Buddy page source with multi-zone support
///
/// The managed memory is written to: free blocks carry the free list links.
/// Regions handed to [`BaseAllocator::init`] and
/// [`BaseAllocator::add_memory`] must be valid, writable and otherwise unused
/// for as long as the page source is alive.
pub struct BuddyPageSource<const PAGE_SIZE: usize = { crate::DEFAULT_PAGE_SIZE }> {
    zones: [BuddySet<PAGE_SIZE>; MAX_ZONES],
    num_zones: usize,
    #[cfg(feature = "tracking")]
    stats: BuddyStats,
}

impl<const PAGE_SIZE: usize> BuddyPageSource<PAGE_SIZE> {
    pub const fn new() -> Self {
        Self {
            zones: [const { BuddySet::<PAGE_SIZE>::empty() }; MAX_ZONES],
            num_zones: 0,
            #[cfg(feature = "tracking")]
            stats: BuddyStats::new(),
        }
    }

    #[cfg(feature = "tracking")]
    pub fn get_stats(&self) -> BuddyStats {
        self.stats
    }

    /// Get number of zones in the page source
    pub fn get_zone_count(&self) -> usize {
        self.num_zones
    }

    /// Total number of pages across all zones
    pub fn total_pages(&self) -> usize {
        self.zones[..self.num_zones]
            .iter()
            .map(|zone| zone.total_pages())
            .sum()
    }

    /// Number of free pages across all zones
    pub fn free_pages(&self) -> usize {
        self.zones[..self.num_zones]
            .iter()
            .map(|zone| zone.free_pages())
            .sum()
    }

    /// Update aggregated statistics from all zones
    #[cfg(feature = "tracking")]
    fn update_stats(&mut self) {
        let mut total_stats = BuddyStats::new();
        for zone in &self.zones[..self.num_zones] {
            total_stats.add(&zone.get_stats());
        }
        self.stats = total_stats;
    }

    /// Add a new memory region as a new zone
    pub fn add_memory_region(&mut self, start: usize, size: usize) -> AllocResult<()> {
        if self.num_zones >= MAX_ZONES {
            error!(
                "buddy page source: Cannot add region: maximum zones ({}) reached",
                MAX_ZONES
            );
            return Err(AllocError::NoMemory);
        }

        // Only whole pages inside the region are usable
        let aligned_start = crate::align_up(start, PAGE_SIZE);
        let aligned_end = crate::align_down(start + size, PAGE_SIZE);
        if aligned_end <= aligned_start {
            warn!(
                "buddy page source: region [{:#x}, {:#x}) holds no whole page, skipping",
                start,
                start + size
            );
            return Err(AllocError::InvalidParam);
        }

        // Check for overlap with existing zones
        for (i, zone) in self.zones[..self.num_zones].iter().enumerate() {
            if !(aligned_end <= zone.base_addr || aligned_start >= zone.end_addr) {
                error!(
                    "buddy page source: Region [{:#x}, {:#x}) overlaps with zone {} [{:#x}, {:#x})",
                    aligned_start, aligned_end, i, zone.base_addr, zone.end_addr
                );
                return Err(AllocError::MemoryOverlap);
            }
        }

        let zone_id = self.num_zones;
        let aligned_size = aligned_end - aligned_start;
        self.zones[zone_id] = BuddySet::new(aligned_start, aligned_size, zone_id);
        self.zones[zone_id].init(aligned_start, aligned_size);
        self.num_zones += 1;

        #[cfg(feature = "tracking")]
        self.update_stats();

        debug!(
            "buddy page source: zone {} [{:#x}, {:#x}) added, {} pages",
            zone_id,
            aligned_start,
            aligned_end,
            aligned_size / PAGE_SIZE
        );
        Ok(())
    }

    /// Find the zone that contains the given address
    pub fn find_zone_for_addr(&self, addr: usize) -> Option<usize> {
        self.zones[..self.num_zones]
            .iter()
            .position(|zone| zone.addr_in_zone(addr))
    }

    /// Print all zone information and block distribution
    pub fn print_zone_info(&self) {
        info!("========== Buddy Page Source Zones Info ==========");
        info!("Total zones: {}", self.num_zones);
        info!("Page size: {:#x}", PAGE_SIZE);

        for zone in &self.zones[..self.num_zones] {
            let _zone_info = zone.zone_info();
            info!(
                "Zone {}: [{:#x}, {:#x}), {} pages, {} free",
                _zone_info.zone_id,
                _zone_info.start_addr,
                _zone_info.end_addr,
                _zone_info.total_pages,
                zone.free_pages()
            );
            for order in 0..=zone.max_order() {
                let _block_count = zone.get_order_block_count(order);
                if _block_count > 0 {
                    info!(
                        "    Order {}: {} blocks ({:#x} bytes each)",
                        order,
                        _block_count,
                        PAGE_SIZE << order
                    );
                }
            }
        }
        info!("===================================================");
    }

    #[cfg(feature = "tracking")]
    fn print_alloc_failure_stats(&self, order: usize) {
        let mut zones = [(super::stats::ZoneInfo::default(), BuddyStats::new()); MAX_ZONES];
        for (slot, zone) in zones.iter_mut().zip(&self.zones[..self.num_zones]) {
            *slot = (zone.zone_info(), zone.get_stats());
        }
        MemoryStatsReporter::print_alloc_failure_stats(
            PAGE_SIZE,
            &self.stats,
            &zones[..self.num_zones],
            order,
        );
    }

    #[cfg(not(feature = "tracking"))]
    fn print_alloc_failure_stats(&self, _order: usize) {
        // No-op when tracking is disabled
    }
}

impl<const PAGE_SIZE: usize> Default for BuddyPageSource<PAGE_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const PAGE_SIZE: usize> BaseAllocator for BuddyPageSource<PAGE_SIZE> {
    /// Drop all zones and start over with a single region.
    fn init(&mut self, start: usize, size: usize) {
        self.num_zones = 0;
        if self.add_memory_region(start, size).is_err() {
            error!(
                "buddy page source: failed to initialize with [{:#x}, {:#x})",
                start,
                start + size
            );
        }
    }

    fn add_memory(&mut self, start: usize, size: usize) -> AllocResult<()> {
        self.add_memory_region(start, size)
    }
}

impl<const PAGE_SIZE: usize> PageSource for BuddyPageSource<PAGE_SIZE> {
    const PAGE_SIZE: usize = PAGE_SIZE;

    fn alloc_block(&mut self, order: usize) -> AllocResult<usize> {
        for i in 0..self.num_zones {
            match self.zones[i].alloc_block(order) {
                Ok(addr) => {
                    #[cfg(feature = "tracking")]
                    self.update_stats();
                    return Ok(addr);
                }
                Err(AllocError::NoMemory) => continue,
                Err(e) => return Err(e),
            }
        }

        debug!(
            "buddy page source: Allocation failure: order {} ({} bytes)",
            order,
            PAGE_SIZE << order
        );
        self.print_alloc_failure_stats(order);
        Err(AllocError::NoMemory)
    }

    fn free_block(&mut self, addr: usize, order: usize) {
        if let Some(zone_idx) = self.find_zone_for_addr(addr) {
            self.zones[zone_idx].dealloc_block(addr, order);
            #[cfg(feature = "tracking")]
            self.update_stats();
        } else {
            warn!(
                "buddy page source: free block at {:#x}: address not in any zone",
                addr
            );
        }
    }
}
