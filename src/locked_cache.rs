//! Lock-protected slab cache.
//!
//! A [`SlabCache`] assumes a single user. This wrapper serializes whole
//! cache operations behind a spin lock with interrupts disabled so one cache
//! can be shared, e.g. from a `static`.

use core::ptr::NonNull;

use kspin::{SpinNoIrq, SpinNoIrqGuard};

use crate::slab::{CacheStats, SlabCache};
use crate::{AllocResult, PageSource};

pub struct LockedSlabCache<S: PageSource> {
    inner: SpinNoIrq<SlabCache<S>>,
}

impl<S: PageSource> LockedSlabCache<S> {
    pub fn setup(object_size: usize, page_source: S) -> AllocResult<Self> {
        Ok(Self::new(SlabCache::setup(object_size, page_source)?))
    }

    pub const fn new(cache: SlabCache<S>) -> Self {
        Self {
            inner: SpinNoIrq::new(cache),
        }
    }

    /// Lock the cache for a sequence of operations.
    pub fn lock(&self) -> SpinNoIrqGuard<'_, SlabCache<S>> {
        self.inner.lock()
    }

    pub fn into_inner(self) -> SlabCache<S> {
        self.inner.into_inner()
    }

    pub fn alloc(&self) -> AllocResult<NonNull<u8>> {
        self.inner.lock().alloc()
    }

    /// Return an object to the cache.
    ///
    /// # Safety
    ///
    /// Same contract as [`SlabCache::free`].
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        unsafe { self.inner.lock().free(ptr) }
    }

    pub fn shrink(&self) -> usize {
        self.inner.lock().shrink()
    }

    pub fn release(&self) {
        self.inner.lock().release()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }

    pub fn object_size(&self) -> usize {
        self.inner.lock().object_size()
    }
}
