//! Kernel state cell
//!
//! Shared kernel structures live in a [`CsCell`]; borrowing one needs
//! proof that the critical section is held.

use core::cell::UnsafeCell;
use crate::critical::CriticalSection;

pub struct CsCell<T>(UnsafeCell<T>);

// Every shared access goes through `get`, which takes the lock token
unsafe impl<T> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Borrow the contents while the critical section is held
    ///
    /// Two borrows obtained this way must not be alive at once.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub fn get(&self, _cs: &CriticalSection) -> &mut T {
        unsafe { &mut *self.0.get() }
    }

    /// Borrow through `&mut self`, no lock needed
    #[inline(always)]
    pub fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }

    #[inline(always)]
    pub const fn as_ptr(&self) -> *mut T {
        self.0.get()
    }
}
