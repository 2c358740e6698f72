//! Binary semaphores
//!
//! A counting semaphore whose counter never goes above one. Signaling a
//! free binary semaphore is a no-op.

use crate::kernel::{Kernel, SysLock};
use crate::port::Port;
use crate::sync::sem::Semaphore;
use crate::types::{Msg, Timeout};

pub struct BinarySemaphore {
    sem: Semaphore,
}

impl BinarySemaphore {
    pub const fn new(taken: bool) -> Self {
        BinarySemaphore {
            sem: Semaphore::new(if taken { 0 } else { 1 }),
        }
    }

    pub fn wait<P: Port>(&self, kernel: &Kernel<P>) -> Msg {
        self.sem.wait(kernel)
    }

    pub fn wait_s<P: Port>(&self, lock: &mut SysLock<'_, P>) -> Msg {
        self.sem.wait_s(lock)
    }

    pub fn wait_timeout<P: Port>(&self, kernel: &Kernel<P>, timeout: Timeout) -> Msg {
        self.sem.wait_timeout(kernel, timeout)
    }

    pub fn wait_timeout_s<P: Port>(&self, lock: &mut SysLock<'_, P>, timeout: Timeout) -> Msg {
        self.sem.wait_timeout_s(lock, timeout)
    }

    pub fn signal<P: Port>(&self, kernel: &Kernel<P>) {
        let mut lock = kernel.lock();
        self.signal_i(&mut lock);
        lock.reschedule_s();
    }

    pub fn signal_i<P: Port>(&self, lock: &mut SysLock<'_, P>) {
        if self.sem.counter_i(lock) < 1 {
            self.sem.signal_i(lock);
        }
    }

    /// Release every waiter with `Msg::Reset` and leave the semaphore
    /// taken or free
    pub fn reset<P: Port>(&self, kernel: &Kernel<P>, taken: bool) {
        let mut lock = kernel.lock();
        self.reset_i(&mut lock, taken);
        lock.reschedule_s();
    }

    pub fn reset_i<P: Port>(&self, lock: &mut SysLock<'_, P>, taken: bool) {
        self.sem.reset_i(lock, if taken { 0 } else { 1 });
    }

    pub fn is_taken<P: Port>(&self, kernel: &Kernel<P>) -> bool {
        let lock = kernel.lock();
        self.is_taken_i(&lock)
    }

    pub fn is_taken_i<P: Port>(&self, lock: &SysLock<'_, P>) -> bool {
        self.sem.counter_i(lock) <= 0
    }
}
