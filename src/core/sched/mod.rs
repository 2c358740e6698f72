//! Scheduler module
//!
//! Priority-based preemptive scheduler with round-robin for same priority.
//!
//! [`Scheduler`] is the kernel state proper: the thread arena, the ready
//! list, the registry, the timeout list and the system time. It is a pure
//! state machine; every transition that needs a context switch returns the
//! `(from, to)` arena slots and the kernel lock performs the switch through
//! the port.

mod rdy_list;

pub use rdy_list::ReadyList;

use crate::config::{KernelConfig, CFG_THREADS_MAX};
use crate::core::debug::{halt, os_assert, os_check, CheckLevel, CheckScope, HaltFlag};
use crate::core::list::RegistryList;
use crate::thread::tcb::{Thread, ThreadId, WaitTarget};
use crate::time::TimeoutList;
use crate::types::{Msg, Prio, SleepReason, Systime, ThreadState, Ticks};

/// Outgoing and incoming arena slots of a context switch
pub type Switch = (usize, usize);

/// Kernel scheduling state
pub struct Scheduler {
    pub(crate) threads: [Thread; CFG_THREADS_MAX],
    pub(crate) ready: ReadyList,
    pub(crate) registry: RegistryList,
    pub(crate) timeouts: TimeoutList,
    pub(crate) config: KernelConfig,
    current: usize,
    idle: usize,
    systime: Systime,
    initialized: bool,
    halted: HaltFlag,
}

impl Scheduler {
    pub const fn new(config: KernelConfig) -> Self {
        Scheduler {
            threads: [Thread::EMPTY; CFG_THREADS_MAX],
            ready: ReadyList::new(),
            registry: RegistryList::new(),
            timeouts: TimeoutList::new(),
            config,
            current: 0,
            idle: 0,
            systime: 0,
            initialized: false,
            halted: HaltFlag::new(),
        }
    }

    // ============ Accessors ============

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// `true` once a check of this kernel failed
    #[inline]
    pub fn has_halted(&self) -> bool {
        self.halted.get()
    }

    pub(crate) fn set_initialized(&mut self, idle: usize) {
        self.idle = idle;
        self.initialized = true;
    }

    #[inline]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[inline]
    pub fn systime(&self) -> Systime {
        self.systime
    }

    /// Arena slot of the running thread
    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    pub(crate) fn set_current(&mut self, idx: usize) {
        self.current = idx;
    }

    #[inline]
    pub fn current_id(&self) -> ThreadId {
        self.id_of(self.current)
    }

    #[inline]
    pub fn idle(&self) -> usize {
        self.idle
    }

    #[inline]
    pub fn id_of(&self, idx: usize) -> ThreadId {
        ThreadId::new(idx, self.threads[idx].generation)
    }

    /// Arena slot behind a handle
    pub fn resolve(&self, id: ThreadId) -> usize {
        let idx = id.index();
        os_check!(
            in self,
            idx < CFG_THREADS_MAX
                && self.threads[idx].used
                && self.threads[idx].generation == id.generation(),
            "stale thread handle"
        );
        idx
    }

    #[inline]
    pub fn thread(&self, idx: usize) -> &Thread {
        &self.threads[idx]
    }

    #[inline]
    pub fn thread_mut(&mut self, idx: usize) -> &mut Thread {
        &mut self.threads[idx]
    }

    /// Priority of the first ready thread
    #[inline]
    pub fn first_prio(&self) -> Prio {
        self.ready.first_prio()
    }

    /// Quantum handed to a thread that starts a new time slice
    #[inline]
    fn quantum(&self) -> u32 {
        self.config.time_quantum
    }

    /// First unused arena slot
    pub(crate) fn alloc_slot(&self) -> Option<usize> {
        self.threads.iter().position(|t| !t.used)
    }

    // ============ Ready list transitions ============

    /// Insert a thread in the ready list behind its peers
    pub fn ready_behind(&mut self, idx: usize) {
        let state = self.threads[idx].state;
        os_assert!(
            in &*self,
            state != ThreadState::Ready && state != ThreadState::Final,
            "invalid state"
        );

        self.threads[idx].state = ThreadState::Ready;
        self.ready.insert_behind(&mut self.threads, idx);
    }

    /// Insert a thread in the ready list ahead of its peers
    pub fn ready_ahead(&mut self, idx: usize) {
        let state = self.threads[idx].state;
        os_assert!(
            in &*self,
            state != ThreadState::Ready && state != ThreadState::Final,
            "invalid state"
        );

        self.threads[idx].state = ThreadState::Ready;
        self.ready.insert_ahead(&mut self.threads, idx);
    }

    /// Make the first ready thread the running one
    fn switch_in_first(&mut self) -> usize {
        let next = self.ready.remove_first(&mut self.threads);
        os_assert!(in &*self, next.is_some(), "empty ready list");
        let next = next.unwrap_or(self.idle);

        self.threads[next].state = ThreadState::Running;
        self.current = next;
        next
    }

    // ============ Sleep and wakeup ============

    /// Put the running thread to sleep in `state`
    pub(crate) fn go_to_sleep(&mut self, state: ThreadState, wait: WaitTarget) -> Switch {
        let otp = self.current;
        os_assert!(in &*self, otp != self.idle, "idle thread cannot sleep");

        let quantum = self.quantum();
        let thread = &mut self.threads[otp];
        thread.state = state;
        thread.wait = wait;
        thread.ticks = quantum;

        let ntp = self.switch_in_first();
        (otp, ntp)
    }

    /// Wake a sleeping thread from thread context
    ///
    /// The woken thread runs immediately if it outranks the caller,
    /// otherwise it queues behind its peers.
    pub fn wakeup(&mut self, idx: usize, msg: Msg) -> Option<Switch> {
        self.threads[idx].rdymsg = msg;

        let otp = self.current;
        if self.threads[idx].prio <= self.threads[otp].prio {
            self.ready_behind(idx);
            return None;
        }

        self.ready_ahead(otp);
        self.threads[idx].state = ThreadState::Running;
        self.current = idx;
        Some((otp, idx))
    }

    /// Switch if a ready thread outranks the running one
    pub fn reschedule(&mut self) -> Option<Switch> {
        if self.first_prio() > self.threads[self.current].prio {
            return Some(self.reschedule_ahead());
        }
        None
    }

    fn reschedule_ahead(&mut self) -> Switch {
        let otp = self.current;
        let ntp = self.switch_in_first();
        self.ready_ahead(otp);
        (otp, ntp)
    }

    /// Give the CPU to the first ready thread, queueing behind peers
    pub fn reschedule_behind(&mut self) -> Switch {
        let otp = self.current;
        let quantum = self.quantum();
        self.threads[otp].ticks = quantum;

        let ntp = self.switch_in_first();
        self.ready_behind(otp);
        (otp, ntp)
    }

    /// Ready threads of equal or higher priority exist
    #[inline]
    pub fn can_yield(&self) -> bool {
        self.first_prio() >= self.threads[self.current].prio
    }

    /// Decision taken on interrupt return
    ///
    /// With round-robin, a thread whose quantum ran out also yields to
    /// ready threads of its own priority.
    pub fn is_preemption_required(&self) -> bool {
        let p1 = self.first_prio();
        let cur = &self.threads[self.current];

        if self.config.round_robin() && cur.ticks == 0 {
            p1 >= cur.prio
        } else {
            p1 > cur.prio
        }
    }

    /// Preempt the running thread
    pub fn do_preemption(&mut self) -> Switch {
        let otp = self.current;
        let ntp = self.switch_in_first();

        if self.config.round_robin() && self.threads[otp].ticks == 0 {
            // Quantum exhausted, back of the queue with a fresh one
            self.threads[otp].ticks = self.quantum();
            self.ready_behind(otp);
        } else {
            self.ready_ahead(otp);
        }
        (otp, ntp)
    }

    // ============ Timeouts ============

    pub(crate) fn arm_timeout(&mut self, idx: usize, delay: Ticks) {
        self.timeouts.arm(&mut self.threads, idx, delay);
    }

    pub(crate) fn cancel_timeout(&mut self, idx: usize) {
        self.timeouts.cancel(&mut self.threads, idx);
    }

    /// A timeout fired for `idx`
    ///
    /// A thread that a signaler already made ready won the race; it keeps
    /// the signaler's message.
    fn timeout_wakeup(&mut self, idx: usize) {
        let reason = match self.threads[idx].state {
            ThreadState::Sleeping(reason) => reason,
            ThreadState::Ready => return,
            _ => {
                os_assert!(in &*self, false, "timeout on a thread not sleeping");
                return;
            }
        };

        match self.threads[idx].wait {
            // SAFETY: the blocked call keeps its primitive borrowed until
            // the sleeper resumes, and the kernel lock is held.
            WaitTarget::Counted { list, counter } => unsafe {
                *counter.as_ptr() += 1;
                (*list.as_ptr()).remove(&mut self.threads, idx);
            },
            WaitTarget::List(list) => unsafe {
                (*list.as_ptr()).remove(&mut self.threads, idx);
            },
            WaitTarget::Reference(slot) => unsafe {
                *slot.as_ptr() = None;
            },
            WaitTarget::None => {
                os_assert!(
                    in &*self,
                    matches!(reason, SleepReason::Delay | SleepReason::WaitExit),
                    "timeout without wait target"
                );
            }
        }

        crate::trace!("timeout slot {}", idx);
        self.threads[idx].wait = WaitTarget::None;
        self.threads[idx].rdymsg = Msg::Timeout;
        self.ready_behind(idx);
    }

    /// System tick
    pub fn tick(&mut self) {
        self.systime = self.systime.wrapping_add(1);
        crate::core::debug::note_time(self.systime);

        let cur = &mut self.threads[self.current];
        if cur.ticks > 0 {
            cur.ticks -= 1;
        }
        cur.runtime = cur.runtime.wrapping_add(1);

        self.timeouts.tick(&mut self.threads);
        while let Some(idx) = self.timeouts.pop_expired(&mut self.threads) {
            self.timeout_wakeup(idx);
        }
    }
}

impl CheckScope for Scheduler {
    fn check_level(&self) -> CheckLevel {
        self.config.check_level
    }

    fn fail(&self, tag: &'static str) -> ! {
        self.halted.set();
        halt(tag)
    }
}
