//! Core memory allocator
//!
//! Hands out memory from one region by moving a watermark up. Nothing is
//! ever given back; heaps and pools sit on top of it.

use core::ptr::NonNull;

use crate::core::cs_cell::CsCell;
use crate::core::debug::os_check;
use crate::critical::critical_section;
use crate::mem::MemoryProvider;
use crate::types::{checked_align_up, MemoryArea};

struct CoreState {
    base: *mut u8,
    /// Offset of the first free byte
    next: usize,
    size: usize,
}

/// Bump allocator over one region
pub struct MemCore {
    state: CsCell<CoreState>,
}

impl MemCore {
    pub const fn new() -> Self {
        MemCore {
            state: CsCell::new(CoreState {
                base: core::ptr::null_mut(),
                next: 0,
                size: 0,
            }),
        }
    }

    /// Hand over the region to allocate from
    ///
    /// # Safety
    /// The region must be valid for reads and writes and used by nothing
    /// else from now on.
    pub unsafe fn init(&self, region: MemoryArea) {
        critical_section(|cs| {
            let state = self.state.get(cs);
            state.base = region.base;
            state.next = 0;
            state.size = region.size;
        });
    }

    /// Allocate `size` bytes aligned to `align`, with at least `offset`
    /// bytes of the region left in front of the block
    pub fn alloc_aligned_with_offset(&self, size: usize, align: usize, offset: usize) -> Option<NonNull<u8>> {
        os_check!(align.is_power_of_two(), "invalid alignment");

        critical_section(|cs| {
            let state = self.state.get(cs);
            let start = state.base as usize;
            let from = (start + state.next).checked_add(offset)?;
            let p = checked_align_up(from, align)? - start;
            let next = p.checked_add(size)?;
            if next > state.size {
                return None;
            }
            state.next = next;
            NonNull::new(state.base.wrapping_add(p))
        })
    }

    pub fn alloc_aligned(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        self.alloc_aligned_with_offset(size, align, 0)
    }

    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.alloc_aligned(size, core::mem::align_of::<usize>())
    }

    /// Bytes left above the watermark
    pub fn free_bytes(&self) -> usize {
        critical_section(|cs| {
            let state = self.state.get(cs);
            state.size - state.next
        })
    }

    pub fn area(&self) -> MemoryArea {
        critical_section(|cs| {
            let state = self.state.get(cs);
            MemoryArea::new(state.base, state.size)
        })
    }
}

impl Default for MemCore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider for MemCore {
    fn provide(&self, size: usize, align: usize, offset: usize) -> Option<NonNull<u8>> {
        self.alloc_aligned_with_offset(size, align, offset)
    }

    fn area(&self) -> MemoryArea {
        MemCore::area(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(16))]
    struct Region([u8; 256]);

    #[test]
    fn test_watermark_moves_up() {
        let mut region = Region([0; 256]);
        let core = MemCore::new();
        unsafe { core.init(MemoryArea::new(region.0.as_mut_ptr(), 256)) };

        let a = core.alloc_aligned(10, 8).unwrap();
        let b = core.alloc_aligned(8, 8).unwrap();
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 16);
        assert_eq!(core.free_bytes(), 256 - 24);
    }

    #[test]
    fn test_offset_leaves_room_for_header() {
        let mut region = Region([0; 256]);
        let core = MemCore::new();
        unsafe { core.init(MemoryArea::new(region.0.as_mut_ptr(), 256)) };

        let p = core.alloc_aligned_with_offset(32, 16, 16).unwrap();
        assert_eq!(p.as_ptr() as usize - region.0.as_ptr() as usize, 16);
        assert!(core.alloc(256).is_none());
        assert_eq!(core.free_bytes(), 256 - 48);
    }
}
