//! Critical section tokens
//!
//! A [`CriticalSection`] is a zero-sized proof that interrupts able to
//! reach kernel state are masked. The kernel lock hands one out while it is
//! held; [`critical_section`] hands one out for short, self-contained
//! updates outside the scheduler (the core allocator).

/// Proof that the caller runs inside a critical section
pub struct CriticalSection {
    _private: (),
}

impl CriticalSection {
    /// # Safety
    /// The caller must really be inside a critical section for as long as
    /// the token lives.
    #[inline(always)]
    pub(crate) unsafe fn assume() -> Self {
        CriticalSection { _private: () }
    }
}

/// Execute a closure with interrupts disabled
///
/// The closure receives a reference to the critical section token,
/// which can be used to access [`CsCell`](crate::core::cs_cell::CsCell)
/// protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    ::critical_section::with(|_| {
        // SAFETY: `with` keeps the global critical section for the closure.
        let cs = unsafe { CriticalSection::assume() };
        f(&cs)
    })
}
