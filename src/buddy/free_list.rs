//! Address-sorted free block list.
//!
//! Free buddy blocks are at least one page long and nobody else touches
//! them, so the list link is kept in the first word of each block instead of
//! in a separate node pool.

#[cfg(feature = "log")]
use log::error;

pub struct FreeBlockList {
    head: Option<usize>,
    len: usize,
}

impl FreeBlockList {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn clear(&mut self) {
        self.head = None;
        self.len = 0;
    }

    /// Insert a block keeping ascending address order.
    /// Returns false if the block is already on the list.
    pub fn insert_sorted(&mut self, addr: usize) -> bool {
        let mut prev = None;
        let mut current = self.head;

        while let Some(block) = current {
            if block == addr {
                return false;
            }
            if block > addr {
                break;
            }
            prev = current;
            current = read_next(block);
        }

        write_next(addr, current);
        match prev {
            Some(prev_block) => write_next(prev_block, Some(addr)),
            None => self.head = Some(addr),
        }
        self.len += 1;
        true
    }

    pub fn pop_front(&mut self) -> Option<usize> {
        let head = self.head?;
        self.head = read_next(head);
        self.len -= 1;
        Some(head)
    }

    /// Find a block by address.
    ///
    /// Returns the block before it (`None` if it is the head), or `None` if
    /// the block is not on the list.
    pub fn find_by_addr(&self, addr: usize) -> Option<Option<usize>> {
        let mut prev = None;
        let mut current = self.head;
        let mut visited = 0;

        while let Some(block) = current {
            if visited > self.len {
                error!("Potential cycle detected during search");
                return None;
            }
            // Early termination: list is sorted by address
            if block > addr {
                break;
            }
            if block == addr {
                return Some(prev);
            }
            prev = current;
            current = read_next(block);
            visited += 1;
        }

        None
    }

    /// Remove `addr` given the block found before it by [`Self::find_by_addr`].
    pub fn remove_with_prev(&mut self, addr: usize, prev: Option<usize>) {
        let next = read_next(addr);
        match prev {
            Some(prev_block) => write_next(prev_block, next),
            None => self.head = next,
        }
        self.len -= 1;
    }

    /// Check if any block in the list starts within `[start, end)`.
    pub fn has_block_in_range(&self, start: usize, end: usize) -> bool {
        self.iter()
            .take_while(|&block| block < end)
            .any(|block| block >= start)
    }

    pub fn iter(&self) -> FreeBlockIter {
        FreeBlockIter {
            current: self.head,
            remaining: self.len,
        }
    }
}

pub struct FreeBlockIter {
    current: Option<usize>,
    remaining: usize,
}

impl Iterator for FreeBlockIter {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let block = self.current?;
        self.current = read_next(block);
        self.remaining -= 1;
        Some(block)
    }
}

fn read_next(block: usize) -> Option<usize> {
    match unsafe { *(block as *const usize) } {
        0 => None,
        next => Some(next),
    }
}

fn write_next(block: usize, next: Option<usize>) {
    unsafe { *(block as *mut usize) = next.unwrap_or(0) };
}
