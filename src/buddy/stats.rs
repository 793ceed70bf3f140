//! Statistics and debugging for the buddy page source
//!
//! Provides zone descriptors, statistics tracking and failure reporting.

#[cfg(feature = "tracking")]
use crate::MAX_SLAB_ORDER;

/// A memory zone descriptor
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneInfo {
    pub start_addr: usize,
    pub end_addr: usize,
    pub total_pages: usize,
    pub zone_id: usize,
}

/// Buddy system statistics
#[cfg(feature = "tracking")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BuddyStats {
    pub total_pages: usize,
    pub free_pages: usize,
    pub used_pages: usize,
    pub free_blocks_by_order: [usize; MAX_SLAB_ORDER + 1],
}

#[cfg(feature = "tracking")]
impl BuddyStats {
    pub const fn new() -> Self {
        Self {
            total_pages: 0,
            free_pages: 0,
            used_pages: 0,
            free_blocks_by_order: [0; MAX_SLAB_ORDER + 1],
        }
    }

    /// Add statistics from another BuddyStats
    pub fn add(&mut self, other: &BuddyStats) {
        self.total_pages += other.total_pages;
        self.free_pages += other.free_pages;
        self.used_pages += other.used_pages;
        for (i, &count) in other.free_blocks_by_order.iter().enumerate() {
            self.free_blocks_by_order[i] += count;
        }
    }
}

/// Detailed memory statistics reporter
#[cfg(feature = "tracking")]
pub struct MemoryStatsReporter;

#[cfg(feature = "tracking")]
impl MemoryStatsReporter {
    /// Print detailed allocation failure statistics
    #[allow(unused_variables)]
    pub fn print_alloc_failure_stats(
        page_size: usize,
        total_stats: &BuddyStats,
        zones: &[(ZoneInfo, BuddyStats)],
        request_order: usize,
    ) {
        #[cfg(feature = "log")]
        use log::error;

        error!("========================================");
        error!(
            "Request: order {} ({} KB)",
            request_order,
            (page_size << request_order) / 1024
        );
        error!("Overall Memory State:");
        error!("  Total zones: {}", zones.len());
        error!(
            "  Total pages: {} ({} KB)",
            total_stats.total_pages,
            (total_stats.total_pages * page_size) / 1024
        );
        error!(
            "  Free pages: {} ({} KB)",
            total_stats.free_pages,
            (total_stats.free_pages * page_size) / 1024
        );
        error!("========================================");

        for (info, stats) in zones {
            error!("Zone {}:", info.zone_id);
            error!("  Range: [{:#x}, {:#x})", info.start_addr, info.end_addr);
            error!("  Free pages: {} / {}", stats.free_pages, info.total_pages);
            for order in (0..=MAX_SLAB_ORDER).rev() {
                let count = stats.free_blocks_by_order[order];
                if count > 0 {
                    error!(
                        "    Order {}: {} blocks ({} KB each)",
                        order,
                        count,
                        (page_size << order) / 1024
                    );
                }
            }
        }
        error!("========================================");
    }
}
