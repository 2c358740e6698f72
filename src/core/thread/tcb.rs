//! Thread record
//!
//! The kernel keeps every thread in a fixed arena. Applications only see
//! [`ThreadId`] handles; the record itself never leaves the critical section.

use core::ptr::NonNull;

use crate::core::list::ThreadList;
use crate::port::Context;
use crate::types::{MemoryArea, Msg, Prio, ThreadState, Ticks, NOPRIO};

/// Handle to a thread slot
///
/// The generation changes whenever the slot is recycled, so a handle kept
/// past its thread's disposal is detected instead of aliasing a new thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
pub struct ThreadId {
    index: u16,
    generation: u16,
}

impl ThreadId {
    pub(crate) const fn new(index: usize, generation: u16) -> Self {
        ThreadId {
            index: index as u16,
            generation,
        }
    }

    /// Arena slot
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(&self) -> u16 {
        self.generation
    }
}

/// Link pair inside a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Links {
    pub next: Option<usize>,
    pub prev: Option<usize>,
}

impl Links {
    pub const fn new() -> Self {
        Links { next: None, prev: None }
    }
}

/// Position in the timeout delta list
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimerLink {
    pub(crate) next: Option<usize>,
    pub(crate) prev: Option<usize>,
    /// Ticks after the previous entry
    pub(crate) delta: Ticks,
    pub(crate) armed: bool,
}

impl TimerLink {
    pub(crate) const fn new() -> Self {
        TimerLink {
            next: None,
            prev: None,
            delta: 0,
            armed: false,
        }
    }
}

/// Object a sleeping thread is parked on
///
/// The timeout path uses it to take the thread back out of the object.
/// The pointees live in the primitive the thread is blocked in, which
/// stays borrowed by the blocked call for the whole sleep.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WaitTarget {
    None,
    /// Plain wait list
    List(NonNull<ThreadList>),
    /// Wait list paired with a counter to give back on timeout
    Counted {
        list: NonNull<ThreadList>,
        counter: NonNull<i32>,
    },
    /// Single-thread reference slot
    Reference(NonNull<Option<ThreadId>>),
}

/// Returns a dynamic working area to its allocator
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dispose {
    pub(crate) release: unsafe fn(*const (), NonNull<u8>),
    pub(crate) owner: *const (),
    pub(crate) block: NonNull<u8>,
}

impl Dispose {
    /// # Safety
    /// `owner` and `block` must still be valid for `release`.
    pub(crate) unsafe fn run(self) {
        unsafe { (self.release)(self.owner, self.block) }
    }
}

/// Thread control block
#[derive(Debug, Clone, Copy)]
pub struct Thread {
    // ============ Context ============
    pub(crate) ctx: Context,

    // ============ Slot bookkeeping ============
    pub(crate) used: bool,
    pub(crate) generation: u16,

    // ============ Identification ============
    pub(crate) name: &'static str,
    pub(crate) prio: Prio,
    pub(crate) state: ThreadState,
    /// Working area, empty for the main thread
    pub(crate) area: MemoryArea,

    // ============ Links ============
    pub(crate) queue: Links,
    pub(crate) registry: Links,
    pub(crate) timer: TimerLink,

    // ============ Scheduling ============
    /// Remaining round-robin quantum
    pub(crate) ticks: u32,
    /// Ticks spent running
    pub(crate) runtime: Ticks,

    // ============ Wakeup ============
    pub(crate) rdymsg: Msg,
    pub(crate) wait: WaitTarget,

    // ============ Termination ============
    pub(crate) exit_code: i32,
    /// Threads blocked in `wait_for_exit` on this one
    pub(crate) waiting: ThreadList,
    pub(crate) refs: u8,
    pub(crate) terminate: bool,
    pub(crate) dispose: Option<Dispose>,
}

impl Thread {
    pub(crate) const EMPTY: Thread = Thread {
        ctx: Context::new(),
        used: false,
        generation: 0,
        name: "",
        prio: NOPRIO,
        state: ThreadState::Final,
        area: MemoryArea::empty(),
        queue: Links::new(),
        registry: Links::new(),
        timer: TimerLink::new(),
        ticks: 0,
        runtime: 0,
        rdymsg: Msg::Ok,
        wait: WaitTarget::None,
        exit_code: 0,
        waiting: ThreadList::new(),
        refs: 0,
        terminate: false,
        dispose: None,
    };

    /// Reset a free slot for a new thread, keeping its generation
    pub(crate) fn object_init(&mut self, name: &'static str, prio: Prio, quantum: u32) {
        let generation = self.generation;
        *self = Thread::EMPTY;
        self.generation = generation;
        self.used = true;
        self.name = name;
        self.prio = prio;
        self.state = ThreadState::WaitingStart;
        self.ticks = quantum;
        self.refs = 1;
    }

    /// Mark the slot free and invalidate outstanding handles
    pub(crate) fn recycle(&mut self) {
        self.used = false;
        self.generation = self.generation.wrapping_add(1);
    }

    #[inline]
    pub(crate) fn is_sleeping(&self) -> bool {
        matches!(self.state, ThreadState::Sleeping(_))
    }
}

/// Snapshot of a thread taken from the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: &'static str,
    pub prio: Prio,
    pub state: ThreadState,
    pub refs: u8,
    pub runtime: Ticks,
}
