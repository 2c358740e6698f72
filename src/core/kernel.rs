//! Kernel object and the system lock
//!
//! A [`Kernel`] owns the hardware port and the scheduler state. All kernel
//! state sits behind one lock: the port's critical section. Taking it
//! yields a [`SysLock`] guard, and S-class and I-class functions take that
//! guard as their first argument so the "lock held" precondition is a
//! type-level contract instead of a convention.

use core::ptr::{addr_of, addr_of_mut};

use portable_atomic::{AtomicBool, Ordering};

use crate::config::{KernelConfig, QueuePolicy, CFG_IDLE_STACK_SIZE, CFG_STACK_FILL_VALUE};
use crate::core::cs_cell::CsCell;
use crate::core::debug::{halt, os_assert, os_check, CheckLevel, CheckScope, HaltFlag};
use crate::core::list::ThreadList;
use crate::critical::CriticalSection;
use crate::port::Port;
use crate::sched::{Scheduler, Switch};
use crate::thread::tcb::WaitTarget;
use crate::thread::{ThreadDescriptor, ThreadId, WorkingArea};
use crate::types::{Msg, SleepReason, Systime, ThreadState, Timeout, IDLEPRIO, NORMALPRIO};

/// Working area type of the idle thread
pub type IdleWorkingArea = WorkingArea<CFG_IDLE_STACK_SIZE>;

/// An RTOS instance bound to one port
pub struct Kernel<P: Port> {
    port: P,
    config: KernelConfig,
    sched: CsCell<Scheduler>,
    locked: AtomicBool,
    halted: HaltFlag,
}

impl<P: Port> Kernel<P> {
    pub const fn new(port: P, config: KernelConfig) -> Self {
        Kernel {
            port,
            config,
            sched: CsCell::new(Scheduler::new(config)),
            locked: AtomicBool::new(false),
            halted: HaltFlag::new(),
        }
    }

    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// `true` once one of this kernel's checks failed
    ///
    /// Takes the kernel lock, so it is for thread context only.
    pub fn has_halted(&self) -> bool {
        self.halted.get() || self.lock().sched().has_halted()
    }

    // ============ Lock ============

    /// Enter the kernel from thread context
    pub fn lock(&self) -> SysLock<'_, P> {
        self.acquire(false)
    }

    /// Enter the kernel from an interrupt handler
    pub fn lock_from_isr(&self) -> SysLock<'_, P> {
        self.acquire(true)
    }

    fn acquire(&self, from_isr: bool) -> SysLock<'_, P> {
        self.port.enter_critical();
        let was_locked = self.locked.swap(true, Ordering::Acquire);
        os_check!(in self, !was_locked, "misplaced lock");

        SysLock {
            kernel: self,
            // SAFETY: the port critical section was entered above and is
            // left when the guard drops.
            cs: unsafe { CriticalSection::assume() },
            from_isr,
        }
    }

    /// Interrupt handler body
    ///
    /// Runs `f` under the interrupt-class lock, then preempts the
    /// interrupted thread if `f` readied a thread that should run.
    pub fn isr<R>(&self, f: impl FnOnce(&mut SysLock<'_, P>) -> R) -> R {
        let mut lock = self.lock_from_isr();
        let r = f(&mut lock);

        if lock.sched().is_initialized() && lock.sched().is_preemption_required() {
            let sw = lock.sched().do_preemption();
            lock.switch(sw);
        }
        r
    }

    /// System tick handler
    pub fn tick_from_isr(&self) {
        self.isr(|lock| lock.sched().tick());
    }

    /// Current system time
    pub fn now(&self) -> Systime {
        self.lock().sched().systime()
    }

    // ============ Startup ============

    /// Turn the caller into the main thread and create the idle thread
    ///
    /// Must be called once, before any other kernel service.
    pub fn init(&'static self, idle_wa: &'static IdleWorkingArea) {
        let mut lock = self.lock();
        os_check!(in &lock, !lock.sched().is_initialized(), "kernel already initialized");

        let quantum = self.config.time_quantum;
        let sched = lock.sched();
        let main = match sched.alloc_slot() {
            Some(idx) => idx,
            None => sched.fail("no slot for main"),
        };
        let thread = sched.thread_mut(main);
        thread.object_init("main", NORMALPRIO, quantum);
        thread.state = ThreadState::Running;
        self.port.init_main(&mut thread.ctx);
        sched.set_current(main);
        sched.registry.push_back(&mut sched.threads, main);

        let arg = self as *const Kernel<P> as *mut ();
        let desc = ThreadDescriptor::new("idle", idle_wa, IDLEPRIO, idle_entry::<P>, arg);
        let idle = match lock.create_thread_s(&desc) {
            Ok(idx) => idx,
            Err(_) => lock.fail("idle thread"),
        };
        lock.sched().ready_behind(idle);
        lock.sched().set_initialized(idle);

        crate::info!("kernel initialized");
    }

    /// Start the system tick
    pub fn start(&self) {
        let initialized = self.lock().sched().is_initialized();
        os_check!(in self, initialized, "kernel not initialized");
        self.port.arm_tick(&self.config);
        crate::info!("kernel started, {} Hz", self.config.tick_rate_hz);
    }
}

fn idle_entry<P: Port>(arg: *mut ()) -> ! {
    // SAFETY: `init` passes a `&'static Kernel<P>`.
    let kernel = unsafe { &*(arg as *const Kernel<P>) };
    loop {
        kernel.port.idle_hook();
    }
}

/// Held kernel lock
///
/// Dropping the guard leaves the critical section. A thread-class guard
/// also checks that no ready thread outranks the running one, which
/// catches S-class callers that forgot to reschedule.
pub struct SysLock<'k, P: Port> {
    kernel: &'k Kernel<P>,
    cs: CriticalSection,
    from_isr: bool,
}

impl<'k, P: Port> SysLock<'k, P> {
    #[inline]
    pub fn kernel(&self) -> &'k Kernel<P> {
        self.kernel
    }

    /// Critical section token backing this lock
    #[inline]
    pub fn cs(&self) -> &CriticalSection {
        &self.cs
    }

    #[inline]
    pub fn is_isr(&self) -> bool {
        self.from_isr
    }

    #[inline]
    pub(crate) fn sched(&mut self) -> &mut Scheduler {
        self.kernel.sched.get(&self.cs)
    }

    /// Guard for functions that may put the caller to sleep
    #[inline]
    pub(crate) fn check_thread_class(&self) {
        os_check!(in self, !self.from_isr, "S-class call from ISR");
    }

    /// Perform a switch decided by the scheduler
    pub(crate) fn switch(&mut self, (from, to): Switch) {
        let kernel = self.kernel;
        let sched = kernel.sched.as_ptr();

        if kernel.config.stack_check {
            self.check_stack(from);
        }
        crate::trace!("switch {} -> {}", from, to);

        // SAFETY: the lock is held and both slots are live; the contexts
        // are only touched by the port from here on.
        let (from_ctx, to_ctx) = unsafe {
            (
                addr_of_mut!((*sched).threads[from].ctx),
                addr_of!((*sched).threads[to].ctx),
            )
        };

        kernel.locked.store(false, Ordering::Release);
        // SAFETY: contexts come from the arena, `to` was set up by the port.
        unsafe { kernel.port.switch(from_ctx, to_ctx) };
        kernel.locked.store(true, Ordering::Acquire);
    }

    fn check_stack(&mut self, from: usize) {
        let Some(sp) = self.kernel.port.stack_pointer() else {
            return;
        };
        let area = self.sched().thread(from).area;
        if area.size == 0 {
            return;
        }
        if sp.wrapping_sub(P::CONTEXT_SIZE) < area.start() || sp > area.end() {
            self.fail("stack overflow");
        }
    }

    // ============ Scheduler entry points ============

    /// Make a sleeping thread ready, I-class
    ///
    /// The caller wakes threads from interrupt context or batches
    /// wakeups before a final [`SysLock::reschedule_s`].
    pub fn ready_i(&mut self, id: ThreadId, msg: Msg) {
        let sched = self.sched();
        let idx = sched.resolve(id);
        os_check!(in &*sched, sched.thread(idx).is_sleeping(), "not sleeping");
        sched.thread_mut(idx).rdymsg = msg;
        sched.ready_behind(idx);
    }

    pub(crate) fn ready_idx_i(&mut self, idx: usize, msg: Msg) {
        let sched = self.sched();
        sched.thread_mut(idx).rdymsg = msg;
        sched.ready_behind(idx);
    }

    /// Wake a sleeping thread, switching to it if it outranks the caller
    pub fn wakeup_s(&mut self, id: ThreadId, msg: Msg) {
        self.check_thread_class();
        let idx = self.sched().resolve(id);
        os_check!(in &*self, self.sched().thread(idx).is_sleeping(), "not sleeping");
        self.wakeup_idx_s(idx, msg);
    }

    pub(crate) fn wakeup_idx_s(&mut self, idx: usize, msg: Msg) {
        if let Some(sw) = self.sched().wakeup(idx, msg) {
            self.switch(sw);
        }
    }

    /// Switch if a ready thread outranks the caller
    pub fn reschedule_s(&mut self) {
        self.check_thread_class();
        if let Some(sw) = self.sched().reschedule() {
            self.switch(sw);
        }
    }

    /// Link `idx` into a wait list following the kernel queue policy
    pub(crate) fn enqueue_s(&mut self, list: &mut ThreadList, idx: usize) {
        let policy = self.kernel.config.queue_policy;
        let threads = &mut self.sched().threads;
        match policy {
            QueuePolicy::Fifo => list.push_back(threads, idx),
            QueuePolicy::Priority => list.insert_prio(threads, idx),
        }
    }

    /// Put the caller to sleep until another party readies it
    pub(crate) fn go_to_sleep_s(&mut self, reason: SleepReason, wait: WaitTarget) -> Msg {
        self.check_thread_class();
        let sw = self.sched().go_to_sleep(ThreadState::Sleeping(reason), wait);
        let me = sw.0;
        self.switch(sw);
        self.sched().thread(me).rdymsg
    }

    /// As [`go_to_sleep_s`](Self::go_to_sleep_s), bounded by `timeout`
    pub(crate) fn go_to_sleep_timeout_s(
        &mut self,
        reason: SleepReason,
        wait: WaitTarget,
        timeout: Timeout,
    ) -> Msg {
        match timeout {
            Timeout::Immediate | Timeout::After(0) => Msg::Timeout,
            Timeout::Infinite => self.go_to_sleep_s(reason, wait),
            Timeout::After(ticks) => {
                let me = self.sched().current();
                self.sched().arm_timeout(me, ticks);
                let msg = self.go_to_sleep_s(reason, wait);
                // Woken by a signaler, the timer may still be armed
                self.sched().cancel_timeout(me);
                msg
            }
        }
    }

    /// Put the caller in the final state; never returns
    pub(crate) fn go_to_final_s(&mut self) -> ! {
        self.check_thread_class();
        let sw = self.sched().go_to_sleep(ThreadState::Final, WaitTarget::None);
        self.switch(sw);
        self.fail("final thread resumed")
    }

    /// Fill a working area with the stack pattern
    pub(crate) fn fill_area(&self, area: crate::types::MemoryArea) {
        if self.kernel.config.fill_stacks {
            // SAFETY: the area belongs to a thread being created.
            unsafe { core::ptr::write_bytes(area.base, CFG_STACK_FILL_VALUE, area.size) };
        }
    }
}

impl<P: Port> CheckScope for Kernel<P> {
    fn check_level(&self) -> CheckLevel {
        self.config.check_level
    }

    fn fail(&self, tag: &'static str) -> ! {
        self.halted.set();
        halt(tag)
    }
}

impl<P: Port> CheckScope for SysLock<'_, P> {
    fn check_level(&self) -> CheckLevel {
        self.kernel.config.check_level
    }

    fn fail(&self, tag: &'static str) -> ! {
        self.kernel.fail(tag)
    }
}

impl<P: Port> Drop for SysLock<'_, P> {
    fn drop(&mut self) {
        if !self.from_isr && !self.kernel.halted.get() {
            let sched = self.kernel.sched.get(&self.cs);
            if sched.is_initialized() && !sched.has_halted() {
                let cur = sched.thread(sched.current()).prio;
                os_assert!(in &*sched, sched.first_prio() <= cur, "priority order violation");
            }
        }

        self.kernel.locked.store(false, Ordering::Release);
        self.kernel.port.exit_critical();
    }
}
