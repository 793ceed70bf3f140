//! Page source backed by the global Rust allocator.

use core::alloc::Layout;

#[cfg(feature = "log")]
use log::warn;

use crate::{AllocError, AllocResult, PageSource, MAX_SLAB_ORDER};

/// Hands out blocks straight from the global allocator with a layout whose
/// alignment equals its size.
///
/// Keeps a count of outstanding blocks so leaks can be spotted.
pub struct SystemPageSource<const PAGE_SIZE: usize = { crate::DEFAULT_PAGE_SIZE }> {
    outstanding: usize,
}

impl<const PAGE_SIZE: usize> SystemPageSource<PAGE_SIZE> {
    pub const fn new() -> Self {
        Self { outstanding: 0 }
    }

    /// Number of blocks handed out and not yet returned.
    pub fn outstanding_blocks(&self) -> usize {
        self.outstanding
    }

    fn block_layout(order: usize) -> AllocResult<Layout> {
        if order > MAX_SLAB_ORDER {
            return Err(AllocError::InvalidParam);
        }
        let size = PAGE_SIZE << order;
        Layout::from_size_align(size, size).map_err(|_| AllocError::InvalidParam)
    }
}

impl<const PAGE_SIZE: usize> Default for SystemPageSource<PAGE_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const PAGE_SIZE: usize> PageSource for SystemPageSource<PAGE_SIZE> {
    const PAGE_SIZE: usize = PAGE_SIZE;

    fn alloc_block(&mut self, order: usize) -> AllocResult<usize> {
        let layout = Self::block_layout(order)?;
        let addr = unsafe { alloc::alloc::alloc(layout) } as usize;
        if addr == 0 {
            return Err(AllocError::NoMemory);
        }
        self.outstanding += 1;
        Ok(addr)
    }

    fn free_block(&mut self, addr: usize, order: usize) {
        let Ok(layout) = Self::block_layout(order) else {
            warn!(
                "system page source: free of {:#x} with invalid order {}",
                addr, order
            );
            return;
        };
        unsafe { alloc::alloc::dealloc(addr as *mut u8, layout) };
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_size_aligned() {
        let mut source = SystemPageSource::<0x1000>::new();
        for order in 0..=MAX_SLAB_ORDER {
            let addr = source.alloc_block(order).unwrap();
            assert!(crate::is_aligned(addr, 0x1000 << order));
            source.free_block(addr, order);
        }
        assert_eq!(source.outstanding_blocks(), 0);
    }

    #[test]
    fn test_order_out_of_range() {
        let mut source = SystemPageSource::<0x1000>::new();
        assert_eq!(
            source.alloc_block(MAX_SLAB_ORDER + 1),
            Err(AllocError::InvalidParam)
        );
        assert_eq!(source.outstanding_blocks(), 0);
    }
}
