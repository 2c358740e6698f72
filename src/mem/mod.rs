//! Memory management
//!
//! A bump allocator over one region ([`core_alloc::MemCore`]) and the
//! first-fit [`heap::Heap`] that can grow on top of it.

pub mod core_alloc;
pub mod heap;

use core::ptr::NonNull;

use crate::types::MemoryArea;

/// Source of fresh memory for a heap
pub trait MemoryProvider: Sync {
    /// Allocate `size` bytes aligned to `align`, leaving at least `offset`
    /// free bytes in front of the returned pointer
    fn provide(&self, size: usize, align: usize, offset: usize) -> Option<NonNull<u8>>;

    /// Region every provided block lies in
    fn area(&self) -> MemoryArea;
}
