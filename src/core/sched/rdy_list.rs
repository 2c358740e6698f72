//! Ready list - one FIFO of threads per priority level
//!
//! Each priority level has its own list and the priority bitmap says which
//! levels are populated. Threads are added at the tail (behind their peers)
//! or at the head (ahead of their peers) and scheduled from the head of the
//! highest populated level.

use crate::config::CFG_PRIO_LEVELS;
use crate::core::list::ThreadList;
use crate::prio::PrioTable;
use crate::thread::tcb::Thread;
use crate::types::{Prio, NOPRIO};

/// Ready threads ordered by priority, FIFO within a priority
pub struct ReadyList {
    lists: [ThreadList; CFG_PRIO_LEVELS],
    prio_tbl: PrioTable,
}

impl ReadyList {
    pub const fn new() -> Self {
        ReadyList {
            lists: [ThreadList::new(); CFG_PRIO_LEVELS],
            prio_tbl: PrioTable::new(),
        }
    }

    /// Insert behind threads of the same priority
    pub fn insert_behind(&mut self, threads: &mut [Thread], idx: usize) {
        let prio = threads[idx].prio;
        self.lists[prio as usize].push_back(threads, idx);
        self.prio_tbl.insert(prio);
    }

    /// Insert ahead of threads of the same priority
    pub fn insert_ahead(&mut self, threads: &mut [Thread], idx: usize) {
        let prio = threads[idx].prio;
        self.lists[prio as usize].push_front(threads, idx);
        self.prio_tbl.insert(prio);
    }

    /// Take the first thread of the highest priority
    pub fn remove_first(&mut self, threads: &mut [Thread]) -> Option<usize> {
        let prio = self.prio_tbl.get_highest();
        if prio == NOPRIO {
            return None;
        }

        let list = &mut self.lists[prio as usize];
        let idx = list.pop_front(threads);
        if list.is_empty() {
            self.prio_tbl.remove(prio);
        }
        idx
    }

    /// Unlink a thread known to be ready
    pub fn remove(&mut self, threads: &mut [Thread], idx: usize) {
        let prio = threads[idx].prio;
        let list = &mut self.lists[prio as usize];
        list.remove(threads, idx);
        if list.is_empty() {
            self.prio_tbl.remove(prio);
        }
    }

    /// Priority of the first ready thread, `NOPRIO` when empty
    #[inline]
    pub fn first_prio(&self) -> Prio {
        self.prio_tbl.get_highest()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prio_tbl.is_empty()
    }

    /// Ready threads of one priority, head first
    pub fn at(&self, prio: Prio) -> &ThreadList {
        &self.lists[prio as usize]
    }
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}
