//! First-fit heap
//!
//! The heap keeps its free blocks in a singly linked list in address
//! order. Every block, free or used, starts with a [`Header`] one
//! allocation unit wide:
//!
//! - free block: next free header and size in units, header excluded
//! - used block: owning heap and the size requested by the caller
//!
//! Adjacent free blocks are merged as soon as a block is freed. When no
//! block fits, a heap backed by a [`MemoryProvider`] asks it for fresh
//! memory after dropping its own lock.

use core::cell::UnsafeCell;
use core::mem::size_of;
use core::ptr::{addr_of_mut, null, null_mut, NonNull};

use crate::core::debug::{halt, os_assert, os_check};
use crate::kernel::Kernel;
use crate::mem::MemoryProvider;
use crate::port::Port;
use crate::sync::bsem::BinarySemaphore;
use crate::types::{align_up, checked_align_up, MemoryArea};

#[repr(C)]
#[derive(Clone, Copy)]
struct FreeHeader {
    next: *mut Header,
    pages: usize,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct UsedHeader {
    heap: *const (),
    size: usize,
}

#[repr(C)]
#[derive(Clone, Copy)]
union Header {
    free: FreeHeader,
    used: UsedHeader,
}

const UNIT: usize = size_of::<Header>();

/// Serializes access to one heap
///
/// Heap walks can take long, so the heap has its own lock instead of
/// running under the kernel lock.
pub trait HeapLock {
    fn with<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// Heap lock for kernel threads, sleeps on a binary semaphore
pub struct KernelHeapLock<'k, P: Port> {
    kernel: &'k Kernel<P>,
    sem: BinarySemaphore,
}

impl<'k, P: Port> KernelHeapLock<'k, P> {
    pub const fn new(kernel: &'k Kernel<P>) -> Self {
        KernelHeapLock {
            kernel,
            sem: BinarySemaphore::new(false),
        }
    }
}

impl<P: Port> HeapLock for KernelHeapLock<'_, P> {
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        self.sem.wait(self.kernel);
        let r = f();
        self.sem.signal(self.kernel);
        r
    }
}

/// Heap lock masking interrupts through the `critical-section` crate
///
/// For heaps used before the kernel runs or outside kernel threads.
pub struct CsHeapLock;

impl HeapLock for CsHeapLock {
    fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        critical_section::with(|_| f())
    }
}

/// Free list summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
pub struct HeapStatus {
    /// Number of free blocks
    pub fragments: usize,
    /// Free bytes over all blocks, headers excluded
    pub total: usize,
    /// Bytes in the largest free block
    pub largest: usize,
}

struct HeapInner {
    /// List head, never a real block
    header: Header,
    area: MemoryArea,
}

/// First-fit heap
///
/// A heap must not move while blocks allocated from it are live: used
/// blocks record its address.
pub struct Heap<L: HeapLock> {
    lock: L,
    provider: Option<&'static dyn MemoryProvider>,
    inner: UnsafeCell<HeapInner>,
}

// SAFETY: `inner` is only touched under `lock`.
unsafe impl<L: HeapLock + Sync> Sync for Heap<L> {}

#[inline]
fn block(hp: *mut Header) -> *mut Header {
    hp.wrapping_add(1)
}

/// First header past a free block
#[inline]
unsafe fn limit(hp: *mut Header) -> *mut Header {
    // SAFETY: `hp` is a free header per the caller.
    block(hp).wrapping_add(unsafe { (*hp).free.pages })
}

#[inline]
fn npages(p1: *mut Header, p2: *mut Header) -> usize {
    (p1 as usize - p2 as usize) / UNIT
}

impl<L: HeapLock> Heap<L> {
    /// Allocation unit, also the minimum alignment
    pub const UNIT: usize = UNIT;

    const fn with_parts(lock: L, provider: Option<&'static dyn MemoryProvider>) -> Self {
        Heap {
            lock,
            provider,
            inner: UnsafeCell::new(HeapInner {
                header: Header {
                    free: FreeHeader {
                        next: null_mut(),
                        pages: 0,
                    },
                },
                area: MemoryArea::empty(),
            }),
        }
    }

    /// Empty heap, to be given a region with [`init`](Self::init)
    pub const fn new(lock: L) -> Self {
        Self::with_parts(lock, None)
    }

    /// Heap growing on demand from `provider`
    pub const fn with_provider(lock: L, provider: &'static dyn MemoryProvider) -> Self {
        Self::with_parts(lock, Some(provider))
    }

    /// Hand the heap one region
    ///
    /// The region is trimmed to the allocation unit, so the usable size may
    /// be slightly smaller than `region.size`.
    ///
    /// # Safety
    /// The region must be valid for reads and writes and used by nothing
    /// else for the life of the heap.
    pub unsafe fn init(&self, region: MemoryArea) {
        let skip = align_up(region.start(), UNIT) - region.start();
        os_check!(region.size >= skip + 2 * UNIT, "heap region too small");

        let size = region.size - skip;
        let hp: *mut Header = region.base.wrapping_add(skip).cast();
        let pages = (size - UNIT) / UNIT;

        self.lock.with(|| {
            // SAFETY: exclusive under the heap lock, region owned per the
            // caller contract.
            unsafe {
                let inner = self.inner.get();
                (*hp).free = FreeHeader { next: null_mut(), pages };
                (*inner).header.free = FreeHeader { next: hp, pages: 0 };
                (*inner).area = MemoryArea::new(hp.cast(), (pages + 1) * UNIT);
            }
        });
    }

    #[inline]
    fn identity(&self) -> *const () {
        self as *const Self as *const ()
    }

    /// Region the free blocks must lie in
    pub fn area(&self) -> MemoryArea {
        match self.provider {
            Some(provider) => provider.area(),
            // SAFETY: the area only changes in `init`.
            None => unsafe { (*self.inner.get()).area },
        }
    }

    // ============ Allocation ============

    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.alloc_aligned(size, UNIT)
    }

    /// Allocate `size` bytes aligned to `align` (a power of two)
    ///
    /// Returns `None` once both the free list and the provider are
    /// exhausted.
    pub fn alloc_aligned(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        os_check!(size > 0 && align.is_power_of_two(), "invalid allocation");

        let align = align.max(UNIT);
        // A size that cannot be rounded cannot fit anywhere either
        let pages = checked_align_up(size, UNIT)? / UNIT;

        let found = self.lock.with(|| self.alloc_locked(size, align, pages));
        if found.is_some() {
            return found;
        }

        let p = self.provider?.provide(pages * UNIT, align, UNIT)?;
        // SAFETY: the provider left `UNIT` bytes in front of the block.
        unsafe {
            let hp = p.as_ptr().cast::<Header>().wrapping_sub(1);
            (*hp).used = UsedHeader {
                heap: self.identity(),
                size,
            };
        }
        Some(p)
    }

    fn alloc_locked(&self, size: usize, align: usize, pages: usize) -> Option<NonNull<u8>> {
        // SAFETY: called under the heap lock; every header reached from
        // the list head lies in memory owned by the heap.
        unsafe {
            let mut qp: *mut Header = addr_of_mut!((*self.inner.get()).header);

            while !(*qp).free.next.is_null() {
                let mut hp = (*qp).free.next;

                // Header of the first aligned block inside hp
                let blk = block(hp);
                let Some(aligned) = checked_align_up(blk as usize, align) else {
                    qp = hp;
                    continue;
                };
                let skip = (aligned - blk as usize) / UNIT;
                let ahp = blk.wrapping_add(skip).wrapping_sub(1);
                let lim = limit(hp);

                if ahp < lim && pages <= npages(lim, block(ahp)) {
                    if ahp > hp {
                        // Keep the leading part free, split off the tail
                        let bpages = npages(lim, block(ahp));
                        (*hp).free.pages = npages(ahp, block(hp));
                        if bpages > pages {
                            let fp = block(ahp).wrapping_add(pages);
                            (*fp).free = FreeHeader {
                                next: (*hp).free.next,
                                pages: bpages - pages - 1,
                            };
                            (*hp).free.next = fp;
                        }
                        hp = ahp;
                    } else if (*hp).free.pages == pages {
                        (*qp).free.next = (*hp).free.next;
                    } else {
                        let fp = block(hp).wrapping_add(pages);
                        (*fp).free = FreeHeader {
                            next: (*hp).free.next,
                            pages: npages(lim, block(fp)),
                        };
                        (*qp).free.next = fp;
                    }

                    (*hp).used = UsedHeader {
                        heap: self.identity(),
                        size,
                    };
                    return NonNull::new(block(hp).cast());
                }

                qp = hp;
            }
        }
        None
    }

    /// Return a block to the heap
    ///
    /// # Safety
    /// `p` must come from `alloc`/`alloc_aligned` of this heap and must
    /// not be used afterwards.
    pub unsafe fn free(&self, p: NonNull<u8>) {
        os_check!(p.as_ptr() as usize % UNIT == 0, "unaligned pointer");

        let hp = p.as_ptr().cast::<Header>().wrapping_sub(1);
        // SAFETY: every allocated block is preceded by its header.
        unsafe {
            os_check!((*hp).used.heap == self.identity(), "foreign pointer");
            let pages = (*hp).used.size.div_ceil(UNIT);
            (*hp).free = FreeHeader { next: null_mut(), pages };
        }

        self.lock.with(|| self.free_locked(hp));
    }

    fn free_locked(&self, hp: *mut Header) {
        // SAFETY: called under the heap lock with a header of this heap.
        unsafe {
            let head: *mut Header = addr_of_mut!((*self.inner.get()).header);
            let mut qp = head;

            loop {
                os_assert!(hp < qp || hp >= limit(qp), "within free block");

                let next = (*qp).free.next;
                if (qp == head || hp > qp) && (next.is_null() || hp < next) {
                    (*hp).free.next = next;
                    (*qp).free.next = hp;

                    if limit(hp) == (*hp).free.next {
                        let fp = (*hp).free.next;
                        (*hp).free.pages += (*fp).free.pages + 1;
                        (*hp).free.next = (*fp).free.next;
                    }
                    if qp != head && limit(qp) == hp {
                        (*qp).free.pages += (*hp).free.pages + 1;
                        (*qp).free.next = (*hp).free.next;
                    }
                    return;
                }

                if next.is_null() {
                    halt("heap list corrupted");
                }
                qp = next;
            }
        }
    }

    // ============ Diagnostics ============

    /// Walk the free list
    pub fn status(&self) -> HeapStatus {
        self.lock.with(|| {
            let mut status = HeapStatus {
                fragments: 0,
                total: 0,
                largest: 0,
            };
            // SAFETY: read-only walk under the heap lock.
            unsafe {
                let mut hp = (*self.inner.get()).header.free.next;
                while !hp.is_null() {
                    let bytes = (*hp).free.pages * UNIT;
                    status.fragments += 1;
                    status.total += bytes;
                    status.largest = status.largest.max(bytes);
                    hp = (*hp).free.next;
                }
            }
            status
        })
    }

    /// Returns `true` if the free list is corrupted
    ///
    /// Checks address order, header alignment and that every free block
    /// lies inside the heap area.
    pub fn integrity_check(&self) -> bool {
        let area = self.area();
        self.lock.with(|| {
            // SAFETY: the walk stops at the first header that fails a
            // check, before following its link.
            unsafe {
                let mut prev: *const Header = null();
                let mut hp = (*self.inner.get()).header.free.next;
                while !hp.is_null() {
                    if (hp as *const Header) <= prev {
                        return true;
                    }
                    if hp as usize % UNIT != 0 {
                        return true;
                    }
                    if !area.contains(hp as usize, ((*hp).free.pages + 1) * UNIT) {
                        return true;
                    }
                    prev = hp;
                    hp = (*hp).free.next;
                }
            }
            false
        })
    }
}
