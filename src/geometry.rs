//! Cache geometry.
//!
//! Derives, once per object size, how large a cache's slabs are and how many
//! objects each of them holds.

use crate::slab::slab_node::{OBJECT_HEADER_SIZE, SLAB_HEADER_SIZE};
use crate::{AllocError, AllocResult, MAX_SLAB_ORDER};

/// Object count a slab order is grown towards before giving up at
/// [`MAX_SLAB_ORDER`].
pub const MIN_SLAB_OBJECTS: usize = 10;

/// Slab layout shared by every slab of one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeometry {
    /// Requested payload size per object in bytes.
    pub object_size: usize,
    /// Slab size as a power-of-two multiple of the page size.
    pub slab_order: usize,
    /// `page_size << slab_order`.
    pub slab_size: usize,
    /// Number of object slots in one slab.
    pub slab_objects: usize,
}

impl CacheGeometry {
    /// Compute the geometry for `object_size` byte objects on `page_size`
    /// byte pages.
    ///
    /// The smallest order holding at least [`MIN_SLAB_OBJECTS`] objects is
    /// chosen, capped at [`MAX_SLAB_ORDER`]. Large objects can therefore end
    /// up with fewer objects per slab; a geometry that fits no object at all
    /// is rejected.
    pub fn new(object_size: usize, page_size: usize) -> AllocResult<Self> {
        if object_size == 0 || !page_size.is_power_of_two() {
            return Err(AllocError::InvalidParam);
        }

        let mut slab_order = 0;
        while slab_order < MAX_SLAB_ORDER
            && Self::objects_per_slab(page_size << slab_order, object_size) < MIN_SLAB_OBJECTS
        {
            slab_order += 1;
        }

        let slab_size = page_size << slab_order;
        let slab_objects = Self::objects_per_slab(slab_size, object_size);
        if slab_objects == 0 {
            return Err(AllocError::InvalidParam);
        }

        Ok(Self {
            object_size,
            slab_order,
            slab_size,
            slab_objects,
        })
    }

    /// `(slab_size - slab header) / (object_size + object header)`.
    pub const fn objects_per_slab(slab_size: usize, object_size: usize) -> usize {
        if slab_size <= SLAB_HEADER_SIZE {
            return 0;
        }
        match object_size.checked_add(OBJECT_HEADER_SIZE) {
            Some(stride) => (slab_size - SLAB_HEADER_SIZE) / stride,
            None => 0,
        }
    }

    /// Distance between two consecutive object slots.
    pub const fn object_stride(&self) -> usize {
        self.object_size + OBJECT_HEADER_SIZE
    }
}
