//! Core type definitions
//!
//! These types provide strong typing for kernel primitives.

use crate::config::CFG_PRIO_LEVELS;

/// Thread priority, a larger number is a higher priority
pub type Prio = u8;

/// Time interval in ticks
pub type Ticks = u32;

/// Absolute system time in ticks, wraps around
pub type Systime = u32;

/// Thread entry point
pub type ThreadFn = fn(*mut ()) -> !;

// ============ Priorities ============

/// No priority, never assigned to a thread
pub const NOPRIO: Prio = 0;
/// Priority of the idle thread
pub const IDLEPRIO: Prio = 1;
/// Lowest priority usable by applications
pub const LOWPRIO: Prio = 2;
/// Priority of the main thread
pub const NORMALPRIO: Prio = (CFG_PRIO_LEVELS / 2) as Prio;
/// Highest priority
pub const HIGHPRIO: Prio = (CFG_PRIO_LEVELS - 1) as Prio;

/// Wakeup message delivered to a thread leaving a sleep state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
pub enum Msg {
    /// Normal wakeup
    Ok,
    /// The sleep timed out
    Timeout,
    /// The object was reset
    Reset,
    /// Driver or application defined value
    Value(i32),
}

impl From<Msg> for i32 {
    fn from(msg: Msg) -> i32 {
        match msg {
            Msg::Ok => 0,
            Msg::Timeout => -1,
            Msg::Reset => -2,
            Msg::Value(v) => v,
        }
    }
}

/// How long a blocking call may sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
pub enum Timeout {
    /// Never sleep, fail with [`Msg::Timeout`] if the call would block
    Immediate,
    /// Sleep at most this many ticks
    After(Ticks),
    /// No timer is armed
    Infinite,
}

impl Timeout {
    /// `After(0)` is the same as `Immediate`
    #[inline]
    pub const fn ticks(ticks: Ticks) -> Self {
        if ticks == 0 {
            Timeout::Immediate
        } else {
            Timeout::After(ticks)
        }
    }
}

/// Why a thread sleeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
pub enum SleepReason {
    /// Parked on a thread reference
    Suspended,
    /// Waiting in a generic wait queue
    Queued,
    /// Waiting on a semaphore
    Semaphore,
    /// Plain delay
    Delay,
    /// Waiting for another thread to terminate
    WaitExit,
}

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
pub enum ThreadState {
    /// Created, not started
    WaitingStart,
    /// In the ready queue
    Ready,
    /// Owns the CPU
    Running,
    /// Out of the ready queue
    Sleeping(SleepReason),
    /// Terminated, holding its exit code
    Final,
}

/// A contiguous memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryArea {
    pub base: *mut u8,
    pub size: usize,
}

impl MemoryArea {
    pub const fn new(base: *mut u8, size: usize) -> Self {
        Self { base, size }
    }

    pub const fn empty() -> Self {
        Self { base: core::ptr::null_mut(), size: 0 }
    }

    /// Address of the first byte
    #[inline]
    pub fn start(&self) -> usize {
        self.base as usize
    }

    /// Address past the last byte
    #[inline]
    pub fn end(&self) -> usize {
        self.base as usize + self.size
    }

    /// `true` if `[p, p + size)` lies inside this area
    pub fn contains(&self, p: usize, size: usize) -> bool {
        p >= self.start() && size <= self.size && p - self.start() <= self.size - size
    }

    /// `true` if both areas share at least one byte
    pub fn overlaps(&self, other: &MemoryArea) -> bool {
        self.size > 0 && other.size > 0 && self.start() < other.end() && other.start() < self.end()
    }
}

/// Round `v` up to a multiple of `align` (a power of two)
#[inline]
pub const fn align_up(v: usize, align: usize) -> usize {
    (v + align - 1) & !(align - 1)
}

/// [`align_up`] returning `None` instead of overflowing
#[inline]
pub const fn checked_align_up(v: usize, align: usize) -> Option<usize> {
    match v.checked_add(align - 1) {
        Some(x) => Some(x & !(align - 1)),
        None => None,
    }
}

/// Round `v` down to a multiple of `align` (a power of two)
#[inline]
pub const fn align_down(v: usize, align: usize) -> usize {
    v & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_codes() {
        assert_eq!(i32::from(Msg::Ok), 0);
        assert_eq!(i32::from(Msg::Timeout), -1);
        assert_eq!(i32::from(Msg::Reset), -2);
        assert_eq!(i32::from(Msg::Value(42)), 42);
    }

    #[test]
    fn test_area_bounds() {
        let a = MemoryArea::new(0x1000 as *mut u8, 0x100);
        assert!(a.contains(0x1000, 0x100));
        assert!(a.contains(0x10f0, 0x10));
        assert!(!a.contains(0x10f0, 0x11));
        assert!(!a.contains(0x0ff0, 0x10));

        let b = MemoryArea::new(0x10ff as *mut u8, 0x10);
        let c = MemoryArea::new(0x1100 as *mut u8, 0x10);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_priority_ladder() {
        assert!(NOPRIO < IDLEPRIO && IDLEPRIO < LOWPRIO);
        assert!(LOWPRIO < NORMALPRIO && NORMALPRIO < HIGHPRIO);
        assert_eq!(Timeout::ticks(0), Timeout::Immediate);
        assert_eq!(Timeout::ticks(5), Timeout::After(5));
    }
}
