//! Thread references
//!
//! A [`ThreadReference`] parks at most one thread until a driver resumes
//! it, usually from an interrupt handler, with a message.

use core::ptr::NonNull;

use crate::core::cs_cell::CsCell;
use crate::core::debug::os_check;
use crate::kernel::{Kernel, SysLock};
use crate::port::Port;
use crate::thread::tcb::{ThreadId, WaitTarget};
use crate::types::{Msg, SleepReason, Timeout};

/// Slot holding one suspended thread
pub struct ThreadReference {
    slot: CsCell<Option<ThreadId>>,
}

impl ThreadReference {
    pub const fn new() -> Self {
        ThreadReference {
            slot: CsCell::new(None),
        }
    }

    /// Suspend the caller in this reference
    pub fn suspend_s<P: Port>(&self, lock: &mut SysLock<'_, P>) -> Msg {
        self.suspend_timeout_s(lock, Timeout::Infinite)
    }

    /// Suspend the caller in this reference, bounded by `timeout`
    ///
    /// A timeout empties the reference again.
    pub fn suspend_timeout_s<P: Port>(&self, lock: &mut SysLock<'_, P>, timeout: Timeout) -> Msg {
        if matches!(timeout, Timeout::Immediate | Timeout::After(0)) {
            return Msg::Timeout;
        }

        let slot = self.slot.get(lock.cs());
        os_check!(in &*lock, slot.is_none(), "reference in use");
        *slot = Some(lock.sched().current_id());

        // SAFETY: `self` stays borrowed until the caller resumes.
        let target = WaitTarget::Reference(unsafe { NonNull::new_unchecked(self.slot.as_ptr()) });
        lock.go_to_sleep_timeout_s(SleepReason::Suspended, target, timeout)
    }

    /// Resume the suspended thread, if any, I-class
    pub fn resume_i<P: Port>(&self, lock: &mut SysLock<'_, P>, msg: Msg) {
        if let Some(id) = self.slot.get(lock.cs()).take() {
            lock.ready_i(id, msg);
        }
    }

    /// Resume the suspended thread, if any, S-class
    pub fn resume_s<P: Port>(&self, lock: &mut SysLock<'_, P>, msg: Msg) {
        if let Some(id) = self.slot.get(lock.cs()).take() {
            lock.wakeup_s(id, msg);
        }
    }

    pub fn resume<P: Port>(&self, kernel: &Kernel<P>, msg: Msg) {
        let mut lock = kernel.lock();
        self.resume_s(&mut lock, msg);
    }

    /// `true` if no thread is suspended here
    pub fn is_empty_i<P: Port>(&self, lock: &SysLock<'_, P>) -> bool {
        self.slot.get(lock.cs()).is_none()
    }
}

impl Default for ThreadReference {
    fn default() -> Self {
        Self::new()
    }
}
