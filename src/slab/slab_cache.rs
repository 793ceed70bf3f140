//! Slab cache implementation for a single object size.
//!
//! This module implements SlabCache which manages three lists (empty, active,
//! full) of slabs obtained from a [`PageSource`].

use core::ptr::NonNull;

#[cfg(feature = "log")]
use log::{debug, error, info, trace};

use super::slab_list::SlabList;
use super::slab_node::{SlabNode, SlabState};
use crate::geometry::CacheGeometry;
use crate::{AllocResult, PageSource};

/// Snapshot of a cache's slab lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub empty_slabs: usize,
    pub active_slabs: usize,
    pub full_slabs: usize,
    pub free_objects: usize,
    pub allocated_objects: usize,
}

impl CacheStats {
    pub fn total_slabs(&self) -> usize {
        self.empty_slabs + self.active_slabs + self.full_slabs
    }
}

/// Fixed-size object allocator.
///
/// Every slab is on exactly one of three lists matching its [`SlabState`].
/// Allocation prefers active slabs, then empty ones, and only asks the page
/// source for a new slab when neither exists.
///
/// The cache is not synchronized; wrap it in a
/// [`LockedSlabCache`](crate::LockedSlabCache) to share it.
pub struct SlabCache<S: PageSource> {
    geometry: CacheGeometry,
    empty: SlabList,
    active: SlabList,
    full: SlabList,
    page_source: S,
}

impl<S: PageSource> SlabCache<S> {
    /// Create a cache for `object_size` byte objects. No slab is allocated
    /// until the first [`alloc`](Self::alloc).
    pub fn setup(object_size: usize, page_source: S) -> AllocResult<Self> {
        let geometry = CacheGeometry::new(object_size, S::PAGE_SIZE)?;
        info!(
            "slab cache: object_size = {}, slab_order = {}, slab_size = {:#x}, slab_objects = {}",
            geometry.object_size, geometry.slab_order, geometry.slab_size, geometry.slab_objects
        );

        Ok(Self {
            geometry,
            empty: SlabList::new(),
            active: SlabList::new(),
            full: SlabList::new(),
            page_source,
        })
    }

    pub fn geometry(&self) -> &CacheGeometry {
        &self.geometry
    }

    pub fn object_size(&self) -> usize {
        self.geometry.object_size
    }

    pub fn slab_order(&self) -> usize {
        self.geometry.slab_order
    }

    pub fn slab_size(&self) -> usize {
        self.geometry.slab_size
    }

    pub fn slab_objects(&self) -> usize {
        self.geometry.slab_objects
    }

    pub fn page_source(&self) -> &S {
        &self.page_source
    }

    pub fn page_source_mut(&mut self) -> &mut S {
        &mut self.page_source
    }

    /// Allocate one object of [`object_size`](Self::object_size) bytes.
    ///
    /// Fails with [`AllocError::NoMemory`](crate::AllocError::NoMemory) only
    /// when a new slab is needed and the page source cannot provide one; the
    /// cache is left unchanged in that case.
    pub fn alloc(&mut self) -> AllocResult<NonNull<u8>> {
        let (mut slab, fresh) = self.slab_to_alloc()?;
        let capacity = self.geometry.slab_objects;
        let was_empty = slab.free_count() == capacity;

        let Some(obj_addr) = slab.pop_object() else {
            panic!(
                "slab {:#x} selected for allocation has no free object, free list corruption detected",
                slab.addr()
            );
        };

        // A fresh slab is not on any list yet.
        if was_empty && !fresh {
            self.empty.remove(slab);
        }

        if slab.free_count() == 0 {
            if !was_empty {
                self.active.remove(slab);
            }
            self.full.push_front(slab);
        } else if was_empty {
            self.active.push_front(slab);
        }

        Ok(unsafe { NonNull::new_unchecked(obj_addr as *mut u8) })
    }

    /// Return an object to the cache.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`alloc`](Self::alloc) on this very
    /// cache and must not have been freed since. The owning slab is found by
    /// masking the address, so nothing is validated.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        let obj_addr = ptr.as_ptr() as usize;
        let mut slab = SlabNode::containing(obj_addr, self.geometry.slab_size);
        let capacity = self.geometry.slab_objects;
        let was_full = slab.free_count() == 0;

        slab.push_object(obj_addr);

        if was_full {
            self.full.remove(slab);
        }

        if slab.free_count() == capacity {
            if !was_full {
                self.active.remove(slab);
            }
            self.empty.push_front(slab);
        } else if was_full {
            self.active.push_front(slab);
        }
    }

    /// Return every empty slab to the page source. Active and full slabs are
    /// kept. Returns the number of slabs released.
    pub fn shrink(&mut self) -> usize {
        let released = Self::release_list(
            &mut self.empty,
            &mut self.page_source,
            self.geometry.slab_order,
        );
        if released > 0 {
            debug!("slab cache: shrink released {} empty slabs", released);
        }
        released
    }

    /// Return every slab to the page source.
    ///
    /// Objects still allocated from this cache become dangling; callers must
    /// free them first. The cache stays usable and starts over without slabs.
    pub fn release(&mut self) {
        let order = self.geometry.slab_order;
        let _released = Self::release_list(&mut self.empty, &mut self.page_source, order)
            + Self::release_list(&mut self.active, &mut self.page_source, order)
            + Self::release_list(&mut self.full, &mut self.page_source, order);
        info!(
            "slab cache: released {} slabs (object_size = {})",
            _released, self.geometry.object_size
        );
    }

    pub fn stats(&self) -> CacheStats {
        let capacity = self.geometry.slab_objects;
        let mut stats = CacheStats {
            empty_slabs: self.empty.len(),
            active_slabs: self.active.len(),
            full_slabs: self.full.len(),
            ..CacheStats::default()
        };

        for slab in self.empty.iter().chain(self.active.iter()).chain(self.full.iter()) {
            stats.free_objects += slab.free_count();
            stats.allocated_objects += capacity - slab.free_count();
        }
        stats
    }

    /// Walk all three lists and check the bookkeeping: back links, list
    /// lengths, slab alignment, free list lengths and that every slab sits
    /// on the list matching its state. Problems are logged.
    pub fn is_consistent(&self) -> bool {
        let lists = [
            (&self.empty, SlabState::Empty),
            (&self.active, SlabState::Active),
            (&self.full, SlabState::Full),
        ];
        let capacity = self.geometry.slab_objects;
        let mut consistent = true;

        for (list, expected) in lists {
            let mut prev = None;
            let mut count = 0;

            for slab in list.iter() {
                count += 1;
                if count > list.len() {
                    error!(
                        "slab cache: {:?} list longer than its recorded length {}",
                        expected,
                        list.len()
                    );
                    return false;
                }

                if !crate::is_aligned(slab.addr(), self.geometry.slab_size) {
                    error!(
                        "slab cache: slab {:#x} not aligned to {:#x}",
                        slab.addr(),
                        self.geometry.slab_size
                    );
                    consistent = false;
                }
                if slab.prev() != prev {
                    error!("slab cache: slab {:#x} has a stale back link", slab.addr());
                    consistent = false;
                }
                if slab.free_count() > capacity {
                    error!(
                        "slab cache: slab {:#x} free count {} exceeds capacity {}",
                        slab.addr(),
                        slab.free_count(),
                        capacity
                    );
                    consistent = false;
                }
                if slab.free_list_len(capacity) != slab.free_count() {
                    error!(
                        "slab cache: slab {:#x} free list length differs from free count {}",
                        slab.addr(),
                        slab.free_count()
                    );
                    consistent = false;
                }
                let state = slab.state(capacity);
                if state != expected {
                    error!(
                        "slab cache: {:?} slab {:#x} found on the {:?} list",
                        state,
                        slab.addr(),
                        expected
                    );
                    consistent = false;
                }
                prev = Some(slab);
            }

            if count != list.len() {
                error!(
                    "slab cache: {:?} list holds {} slabs, recorded {}",
                    expected,
                    count,
                    list.len()
                );
                consistent = false;
            }
        }

        consistent
    }

    /// Pick the slab the next object comes from.
    /// Returns (slab, freshly_allocated)
    fn slab_to_alloc(&mut self) -> AllocResult<(SlabNode, bool)> {
        if let Some(slab) = self.active.head() {
            trace!("slab cache: allocating from active slab {:#x}", slab.addr());
            return Ok((slab, false));
        }
        if let Some(slab) = self.empty.head() {
            trace!("slab cache: allocating from empty slab {:#x}", slab.addr());
            return Ok((slab, false));
        }
        Ok((self.allocate_new_slab()?, true))
    }

    /// Get a block from the page source and lay a slab out in it. The slab
    /// is not put on any list.
    fn allocate_new_slab(&mut self) -> AllocResult<SlabNode> {
        let addr = self
            .page_source
            .alloc_block(self.geometry.slab_order)
            .inspect_err(|_e| {
                debug!(
                    "slab cache: page source failed to provide an order {} slab: {:?}",
                    self.geometry.slab_order, _e
                );
            })?;
        debug_assert!(crate::is_aligned(addr, self.geometry.slab_size));

        let mut slab = SlabNode::new(addr);
        slab.init(&self.geometry);
        debug!(
            "slab cache: new slab {:#x} with {} objects",
            addr, self.geometry.slab_objects
        );
        Ok(slab)
    }

    fn release_list(list: &mut SlabList, page_source: &mut S, order: usize) -> usize {
        let mut released = 0;
        while let Some(slab) = list.pop_front() {
            debug!("slab cache: returning slab {:#x}", slab.addr());
            page_source.free_block(slab.addr(), order);
            released += 1;
        }
        released
    }
}

impl<S: PageSource> Drop for SlabCache<S> {
    fn drop(&mut self) {
        if !(self.empty.is_empty() && self.active.is_empty() && self.full.is_empty()) {
            self.release();
        }
    }
}
