//! Slab node implementation.
//!
//! A slab is one size-aligned block obtained from a page source. Its first
//! bytes hold a [`SlabHeader`]; the object slots follow back to back. Every
//! slot starts with an [`ObjectHeader`] that links it into the slab's free
//! list while the slot is unallocated. The payload handed out to callers
//! starts right after that header.

use core::mem::size_of;

use crate::geometry::CacheGeometry;

#[repr(C)]
pub(crate) struct SlabHeader {
    next: usize,
    prev: usize,
    next_free_object: usize,
    free_count: usize,
}

#[repr(C)]
pub(crate) struct ObjectHeader {
    next_object: usize,
}

pub(crate) const SLAB_HEADER_SIZE: usize = size_of::<SlabHeader>();
pub(crate) const OBJECT_HEADER_SIZE: usize = size_of::<ObjectHeader>();

/// Occupancy class of a slab, derived from its free object count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabState {
    /// Every object slot is free.
    Empty,
    /// Some, but not all, object slots are allocated.
    Active,
    /// No object slot is free.
    Full,
}

impl SlabState {
    /// State of a slab with `free_count` of its `capacity` slots free.
    pub const fn classify(free_count: usize, capacity: usize) -> Self {
        if free_count == capacity {
            SlabState::Empty
        } else if free_count == 0 {
            SlabState::Full
        } else {
            SlabState::Active
        }
    }
}

/// View of a slab living at `addr`.
///
/// The node itself is only an address; every accessor reads or writes the
/// header in the slab memory, so a node must only be built for a slab that
/// is currently owned by a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlabNode {
    addr: usize,
}

impl SlabNode {
    pub const fn new(addr: usize) -> Self {
        Self { addr }
    }

    /// The slab holding the object at `obj_addr`, found by rounding the
    /// address down to the slab size.
    pub const fn containing(obj_addr: usize, slab_size: usize) -> Self {
        Self::new(crate::align_down(obj_addr, slab_size))
    }

    pub const fn addr(&self) -> usize {
        self.addr
    }

    fn object_base(&self) -> usize {
        self.addr + SLAB_HEADER_SIZE
    }

    fn header(&self) -> &SlabHeader {
        unsafe { &*(self.addr as *const SlabHeader) }
    }

    fn header_mut(&mut self) -> &mut SlabHeader {
        unsafe { &mut *(self.addr as *mut SlabHeader) }
    }

    /// Write a fresh header and thread all object slots onto the free list,
    /// slot 0 first.
    pub fn init(&mut self, geometry: &CacheGeometry) {
        let stride = geometry.object_stride();
        let base = self.object_base();
        let count = geometry.slab_objects;

        for i in 0..count {
            let slot = base + i * stride;
            let next = if i + 1 < count { slot + stride } else { 0 };
            write_link(slot, next);
        }

        *self.header_mut() = SlabHeader {
            next: 0,
            prev: 0,
            next_free_object: if count > 0 { base } else { 0 },
            free_count: count,
        };
    }

    pub fn free_count(&self) -> usize {
        self.header().free_count
    }

    pub fn state(&self, capacity: usize) -> SlabState {
        SlabState::classify(self.free_count(), capacity)
    }

    /// Take the first free slot. Returns the payload address.
    pub fn pop_object(&mut self) -> Option<usize> {
        let header = self.header_mut();
        let slot = header.next_free_object;
        if slot == 0 {
            return None;
        }
        header.next_free_object = read_link(slot);
        header.free_count -= 1;
        Some(slot + OBJECT_HEADER_SIZE)
    }

    /// Put the slot owning payload `obj_addr` back at the head of the free list.
    pub fn push_object(&mut self, obj_addr: usize) {
        let slot = obj_addr - OBJECT_HEADER_SIZE;
        let header = self.header_mut();
        write_link(slot, header.next_free_object);
        header.next_free_object = slot;
        header.free_count += 1;
    }

    /// Walk the free list, stopping after `limit` slots.
    pub fn free_list_len(&self, limit: usize) -> usize {
        let mut len = 0;
        let mut slot = self.header().next_free_object;
        while slot != 0 && len <= limit {
            len += 1;
            slot = read_link(slot);
        }
        len
    }

    pub fn prev(&self) -> Option<SlabNode> {
        match self.header().prev {
            0 => None,
            prev => Some(SlabNode::new(prev)),
        }
    }

    pub fn next(&self) -> Option<SlabNode> {
        match self.header().next {
            0 => None,
            next => Some(SlabNode::new(next)),
        }
    }

    pub fn set_prev(&mut self, prev: Option<SlabNode>) {
        self.header_mut().prev = prev.map_or(0, |node| node.addr);
    }

    pub fn set_next(&mut self, next: Option<SlabNode>) {
        self.header_mut().next = next.map_or(0, |node| node.addr);
    }
}

// Slots are `object_size + header` apart, so an object header is only
// word-aligned when the object size is.
fn read_link(slot: usize) -> usize {
    unsafe { core::ptr::read_unaligned(slot as *const usize) }
}

fn write_link(slot: usize, next: usize) {
    unsafe { core::ptr::write_unaligned(slot as *mut usize, next) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::alloc::{alloc, dealloc};
    use alloc::vec::Vec;
    use core::alloc::Layout;

    const PAGE_SIZE: usize = 0x1000;

    fn with_slab(object_size: usize, f: impl FnOnce(SlabNode, CacheGeometry)) {
        let geometry = CacheGeometry::new(object_size, PAGE_SIZE).unwrap();
        let layout = Layout::from_size_align(geometry.slab_size, geometry.slab_size).unwrap();
        let base = unsafe { alloc(layout) } as usize;
        assert_ne!(base, 0);
        let mut node = SlabNode::new(base);
        node.init(&geometry);
        f(node, geometry);
        unsafe { dealloc(base as *mut u8, layout) };
    }

    #[test]
    fn test_init_builds_full_free_list() {
        with_slab(64, |node, geometry| {
            assert_eq!(node.free_count(), geometry.slab_objects);
            assert_eq!(node.state(geometry.slab_objects), SlabState::Empty);
            assert_eq!(node.free_list_len(geometry.slab_objects), geometry.slab_objects);
            assert!(node.prev().is_none());
            assert!(node.next().is_none());
        });
    }

    #[test]
    fn test_objects_are_handed_out_in_slot_order() {
        with_slab(64, |mut node, geometry| {
            let first = node.pop_object().unwrap();
            let second = node.pop_object().unwrap();
            assert_eq!(first, node.addr() + SLAB_HEADER_SIZE + OBJECT_HEADER_SIZE);
            assert_eq!(second - first, geometry.object_stride());
            assert_eq!(node.free_count(), geometry.slab_objects - 2);
            assert_eq!(node.state(geometry.slab_objects), SlabState::Active);
        });
    }

    #[test]
    fn test_exhaust_and_refill() {
        with_slab(100, |mut node, geometry| {
            let mut objects = Vec::new();
            while let Some(obj) = node.pop_object() {
                assert!(obj + geometry.object_size <= node.addr() + geometry.slab_size);
                objects.push(obj);
            }
            assert_eq!(objects.len(), geometry.slab_objects);
            assert_eq!(node.state(geometry.slab_objects), SlabState::Full);
            assert_eq!(node.free_list_len(geometry.slab_objects), 0);

            // Freed slots come back LIFO.
            let last = objects.pop().unwrap();
            node.push_object(last);
            assert_eq!(node.pop_object(), Some(last));

            node.push_object(last);
            for obj in objects {
                node.push_object(obj);
            }
            assert_eq!(node.state(geometry.slab_objects), SlabState::Empty);
            assert_eq!(node.free_list_len(geometry.slab_objects), geometry.slab_objects);
        });
    }

    #[test]
    fn test_containing_masks_to_slab_base() {
        with_slab(512, |mut node, geometry| {
            while let Some(obj) = node.pop_object() {
                assert_eq!(SlabNode::containing(obj, geometry.slab_size), node);
                assert_eq!(
                    SlabNode::containing(obj + geometry.object_size - 1, geometry.slab_size),
                    node
                );
            }
        });
    }

    #[test]
    fn test_classify() {
        assert_eq!(SlabState::classify(10, 10), SlabState::Empty);
        assert_eq!(SlabState::classify(3, 10), SlabState::Active);
        assert_eq!(SlabState::classify(0, 10), SlabState::Full);
        // A single-object slab is never active.
        assert_eq!(SlabState::classify(1, 1), SlabState::Empty);
        assert_eq!(SlabState::classify(0, 1), SlabState::Full);
    }
}
