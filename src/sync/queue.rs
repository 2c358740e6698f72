//! Generic wait queue
//!
//! An ordered list of sleeping threads for primitives built outside the
//! kernel. Insertion follows the kernel queue policy, like semaphores.

use core::ptr::NonNull;

use crate::core::cs_cell::CsCell;
use crate::core::debug::os_check;
use crate::core::list::ThreadList;
use crate::kernel::SysLock;
use crate::port::Port;
use crate::thread::tcb::WaitTarget;
use crate::types::{Msg, SleepReason, Timeout};

pub struct WaitQueue {
    list: CsCell<ThreadList>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        WaitQueue {
            list: CsCell::new(ThreadList::new()),
        }
    }

    /// Retire the queue, asserting nobody waits on it
    pub fn dispose(&mut self) {
        os_check!(self.list.get_mut().is_empty(), "queue not empty");
    }

    /// Enqueue the caller and sleep until dequeued or timed out
    pub fn enqueue_timeout_s<P: Port>(&self, lock: &mut SysLock<'_, P>, timeout: Timeout) -> Msg {
        lock.check_thread_class();
        if matches!(timeout, Timeout::Immediate | Timeout::After(0)) {
            return Msg::Timeout;
        }

        let list = self.list.get(lock.cs());
        let me = lock.sched().current();
        lock.enqueue_s(list, me);

        // SAFETY: the cell pointer of a live queue is never null.
        let target = WaitTarget::List(unsafe { NonNull::new_unchecked(self.list.as_ptr()) });
        lock.go_to_sleep_timeout_s(SleepReason::Queued, target, timeout)
    }

    /// Wake the first waiter, if any, with `msg`
    pub fn dequeue_next_i<P: Port>(&self, lock: &mut SysLock<'_, P>, msg: Msg) {
        let list = self.list.get(lock.cs());
        if let Some(tp) = list.pop_front(&mut lock.sched().threads) {
            lock.ready_idx_i(tp, msg);
        }
    }

    /// Wake every waiter with `msg`
    pub fn dequeue_all_i<P: Port>(&self, lock: &mut SysLock<'_, P>, msg: Msg) {
        while !self.is_empty_i(lock) {
            self.dequeue_next_i(lock, msg);
        }
    }

    pub fn is_empty_i<P: Port>(&self, lock: &SysLock<'_, P>) -> bool {
        self.list.get(lock.cs()).is_empty()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
