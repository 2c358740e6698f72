//! Semaphore implementation
//!
//! Counting semaphores for thread synchronization and resource counting.
//!
//! The counter goes negative while threads wait: `-cnt` threads are queued.
//! Every operation is offered in three flavors: the plain API takes the
//! kernel lock itself, `_s` functions run under a thread lock the caller
//! already holds, and `_i` functions run under any lock, interrupt locks
//! included, and never reschedule.

use core::ptr::{addr_of_mut, NonNull};

use crate::core::cs_cell::CsCell;
use crate::core::debug::{os_assert, os_check, CheckScope};
use crate::core::list::ThreadList;
use crate::kernel::{Kernel, SysLock};
use crate::port::Port;
use crate::thread::tcb::WaitTarget;
use crate::types::{Msg, SleepReason, Timeout};

struct SemState {
    cnt: i32,
    queue: ThreadList,
}

impl SemState {
    /// `cnt < 0` exactly while threads wait
    #[inline]
    fn check<S: CheckScope + ?Sized>(&self, scope: &S) {
        os_assert!(
            in scope,
            (self.cnt >= 0) == self.queue.is_empty(),
            "inconsistent semaphore"
        );
    }
}

/// Counting semaphore
pub struct Semaphore {
    state: CsCell<SemState>,
}

impl Semaphore {
    /// Create a semaphore holding `n` permits
    pub const fn new(n: i32) -> Self {
        assert!(n >= 0);
        Semaphore {
            state: CsCell::new(SemState {
                cnt: n,
                queue: ThreadList::new(),
            }),
        }
    }

    /// Re-initialize an unused semaphore
    pub fn init(&mut self, n: i32) {
        os_check!(n >= 0, "negative counter");
        let state = self.state.get_mut();
        state.cnt = n;
        state.queue = ThreadList::new();
    }

    /// Retire the semaphore
    ///
    /// Threads still waiting on it are a programming error.
    pub fn dispose(&mut self) {
        let state = self.state.get_mut();
        os_check!(state.cnt >= 0 && state.queue.is_empty(), "semaphore in use");
    }

    #[inline]
    fn state<P: Port>(&self, lock: &SysLock<'_, P>) -> &mut SemState {
        self.state.get(lock.cs())
    }

    /// Wait list and counter, handed to the timeout path
    fn target(&self) -> WaitTarget {
        let state = self.state.as_ptr();
        // SAFETY: field projections of a live cell are never null.
        unsafe {
            WaitTarget::Counted {
                list: NonNull::new_unchecked(addr_of_mut!((*state).queue)),
                counter: NonNull::new_unchecked(addr_of_mut!((*state).cnt)),
            }
        }
    }

    // ============ Wait ============

    pub fn wait<P: Port>(&self, kernel: &Kernel<P>) -> Msg {
        let mut lock = kernel.lock();
        self.wait_s(&mut lock)
    }

    pub fn wait_s<P: Port>(&self, lock: &mut SysLock<'_, P>) -> Msg {
        self.wait_timeout_s(lock, Timeout::Infinite)
    }

    pub fn wait_timeout<P: Port>(&self, kernel: &Kernel<P>, timeout: Timeout) -> Msg {
        let mut lock = kernel.lock();
        self.wait_timeout_s(&mut lock, timeout)
    }

    /// Take a permit, sleeping at most `timeout` for one
    ///
    /// # Returns
    /// * `Msg::Ok` - a permit was taken
    /// * `Msg::Timeout` - none became available in time
    /// * `Msg::Reset` - the semaphore was reset while waiting
    pub fn wait_timeout_s<P: Port>(&self, lock: &mut SysLock<'_, P>, timeout: Timeout) -> Msg {
        lock.check_thread_class();
        let state = self.state(lock);
        state.check(&*lock);

        state.cnt -= 1;
        if state.cnt >= 0 {
            state.check(&*lock);
            return Msg::Ok;
        }
        if matches!(timeout, Timeout::Immediate | Timeout::After(0)) {
            state.cnt += 1;
            state.check(&*lock);
            return Msg::Timeout;
        }

        let me = lock.sched().current();
        lock.enqueue_s(&mut state.queue, me);
        state.check(&*lock);
        lock.go_to_sleep_timeout_s(SleepReason::Semaphore, self.target(), timeout)
    }

    // ============ Signal ============

    pub fn signal<P: Port>(&self, kernel: &Kernel<P>) {
        let mut lock = kernel.lock();
        let state = self.state(&lock);
        state.check(&lock);

        state.cnt += 1;
        if state.cnt <= 0 {
            if let Some(tp) = state.queue.pop_front(&mut lock.sched().threads) {
                state.check(&lock);
                lock.wakeup_idx_s(tp, Msg::Ok);
                return;
            }
        }
        state.check(&lock);
    }

    /// Give a permit back, waking the first waiter if there is one
    pub fn signal_i<P: Port>(&self, lock: &mut SysLock<'_, P>) {
        let state = self.state(lock);
        state.check(&*lock);

        state.cnt += 1;
        if state.cnt <= 0 {
            if let Some(tp) = state.queue.pop_front(&mut lock.sched().threads) {
                lock.ready_idx_i(tp, Msg::Ok);
            }
        }
        state.check(&*lock);
    }

    /// Signal from an interrupt handler, preempting on return if needed
    pub fn signal_from_isr<P: Port>(&self, kernel: &Kernel<P>) {
        kernel.isr(|lock| self.signal_i(lock));
    }

    /// Give back `n` permits at once
    pub fn add_counter<P: Port>(&self, kernel: &Kernel<P>, n: i32) {
        let mut lock = kernel.lock();
        self.add_counter_i(&mut lock, n);
        lock.reschedule_s();
    }

    pub fn add_counter_i<P: Port>(&self, lock: &mut SysLock<'_, P>, n: i32) {
        os_check!(in &*lock, n > 0, "non-positive count");
        for _ in 0..n {
            self.signal_i(lock);
        }
    }

    // ============ Reset ============

    /// Release every waiter with `Msg::Reset` and set the counter to `n`
    pub fn reset<P: Port>(&self, kernel: &Kernel<P>, n: i32) {
        self.reset_with_message(kernel, n, Msg::Reset);
    }

    pub fn reset_i<P: Port>(&self, lock: &mut SysLock<'_, P>, n: i32) {
        self.reset_with_message_i(lock, n, Msg::Reset);
    }

    pub fn reset_with_message<P: Port>(&self, kernel: &Kernel<P>, n: i32, msg: Msg) {
        let mut lock = kernel.lock();
        self.reset_with_message_i(&mut lock, n, msg);
        lock.reschedule_s();
    }

    /// Release every waiter with `msg` and set the counter to `n`
    pub fn reset_with_message_i<P: Port>(&self, lock: &mut SysLock<'_, P>, n: i32, msg: Msg) {
        os_check!(in &*lock, n >= 0, "negative counter");
        let state = self.state(lock);
        state.check(&*lock);

        state.cnt = n;
        while let Some(tp) = state.queue.pop_back(&mut lock.sched().threads) {
            lock.ready_idx_i(tp, msg);
        }
        state.check(&*lock);
    }

    // ============ Signal and wait ============

    /// Signal `sps` and wait on `spw` with no window in between
    ///
    /// Both may be the same semaphore.
    pub fn signal_wait<P: Port>(kernel: &Kernel<P>, sps: &Semaphore, spw: &Semaphore) -> Msg {
        let mut lock = kernel.lock();
        lock.check_thread_class();

        {
            let state = sps.state(&lock);
            state.check(&lock);
            state.cnt += 1;
            if state.cnt <= 0 {
                if let Some(tp) = state.queue.pop_front(&mut lock.sched().threads) {
                    lock.ready_idx_i(tp, Msg::Ok);
                }
            }
            state.check(&lock);
        }

        let state = spw.state(&lock);
        state.check(&lock);
        state.cnt -= 1;
        if state.cnt < 0 {
            let me = lock.sched().current();
            lock.enqueue_s(&mut state.queue, me);
            state.check(&lock);
            lock.go_to_sleep_s(SleepReason::Semaphore, spw.target())
        } else {
            lock.reschedule_s();
            Msg::Ok
        }
    }

    // ============ Counter access ============

    pub fn counter_i<P: Port>(&self, lock: &SysLock<'_, P>) -> i32 {
        self.state(lock).cnt
    }

    /// Take a permit known to be available
    pub fn fast_wait_i<P: Port>(&self, lock: &SysLock<'_, P>) {
        let state = self.state(lock);
        os_check!(in lock, state.cnt > 0, "no permit");
        state.cnt -= 1;
    }

    /// Give a permit back when nobody waits
    pub fn fast_signal_i<P: Port>(&self, lock: &SysLock<'_, P>) {
        let state = self.state(lock);
        os_check!(in lock, state.cnt >= 0, "waiters present");
        state.cnt += 1;
    }
}
