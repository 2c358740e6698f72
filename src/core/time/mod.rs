//! Time management module
//!
//! Timeouts are kept in a delta list threaded through the thread arena:
//! each armed entry stores the ticks remaining after its predecessor, so a
//! tick only touches the head of the list.

use crate::thread::tcb::Thread;
use crate::types::{Systime, Ticks};

/// Delta list of armed thread timeouts
#[derive(Debug, Clone, Copy)]
pub struct TimeoutList {
    head: Option<usize>,
}

impl TimeoutList {
    pub const fn new() -> Self {
        TimeoutList { head: None }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Arm a timeout expiring `delay` ticks from now
    ///
    /// Entries with the same deadline expire in arming order.
    pub fn arm(&mut self, threads: &mut [Thread], idx: usize, delay: Ticks) {
        debug_assert!(delay > 0 && !threads[idx].timer.armed);

        let mut remaining = delay;
        let mut prev = None;
        let mut cursor = self.head;

        while let Some(cur) = cursor {
            let delta = threads[cur].timer.delta;
            if delta > remaining {
                break;
            }
            remaining -= delta;
            prev = Some(cur);
            cursor = threads[cur].timer.next;
        }

        if let Some(next) = cursor {
            threads[next].timer.delta -= remaining;
            threads[next].timer.prev = Some(idx);
        }
        match prev {
            Some(p) => threads[p].timer.next = Some(idx),
            None => self.head = Some(idx),
        }

        let timer = &mut threads[idx].timer;
        timer.delta = remaining;
        timer.prev = prev;
        timer.next = cursor;
        timer.armed = true;
    }

    /// Disarm a timeout, no-op if it is not armed
    pub fn cancel(&mut self, threads: &mut [Thread], idx: usize) {
        let timer = threads[idx].timer;
        if !timer.armed {
            return;
        }

        if let Some(next) = timer.next {
            threads[next].timer.delta += timer.delta;
            threads[next].timer.prev = timer.prev;
        }
        match timer.prev {
            Some(p) => threads[p].timer.next = timer.next,
            None => self.head = timer.next,
        }

        let timer = &mut threads[idx].timer;
        timer.next = None;
        timer.prev = None;
        timer.delta = 0;
        timer.armed = false;
    }

    /// Consume one tick of the head entry
    pub fn tick(&mut self, threads: &mut [Thread]) {
        if let Some(head) = self.head {
            let delta = &mut threads[head].timer.delta;
            *delta = delta.saturating_sub(1);
        }
    }

    /// Unlink and return the next expired entry
    pub fn pop_expired(&mut self, threads: &mut [Thread]) -> Option<usize> {
        let head = self.head?;
        if threads[head].timer.delta != 0 {
            return None;
        }
        self.cancel(threads, head);
        Some(head)
    }

    /// Ticks left before `idx` expires
    pub fn remaining(&self, threads: &[Thread], idx: usize) -> Option<Ticks> {
        let mut total: Ticks = 0;
        let mut cursor = self.head;
        while let Some(cur) = cursor {
            total += threads[cur].timer.delta;
            if cur == idx {
                return Some(total);
            }
            cursor = threads[cur].timer.next;
        }
        None
    }
}

impl Default for TimeoutList {
    fn default() -> Self {
        Self::new()
    }
}

/// Interval from `start` to `end`, wrapping around
#[inline]
pub const fn time_diff(start: Systime, end: Systime) -> Ticks {
    end.wrapping_sub(start)
}

/// `true` if `time` lies in the wrapping window `[start, end)`
#[inline]
pub const fn is_in_range(time: Systime, start: Systime, end: Systime) -> bool {
    time.wrapping_sub(start) < end.wrapping_sub(start)
}
