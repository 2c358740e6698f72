//! Priority bitmap management for O(1) highest-ready lookup
//!
//! One bit per priority level; a set bit means at least one ready thread
//! at that level. Larger numbers are higher priorities, so the lookup
//! scans from the top word down and uses CLZ inside the word.

use crate::config::CFG_PRIO_LEVELS;
use crate::types::{Prio, NOPRIO};

/// Number of words needed for the priority bitmap
const PRIO_TBL_SIZE: usize = (CFG_PRIO_LEVELS + 31) / 32;

/// Priority bitmap table
///
/// Bit `p % 32` of word `p / 32` stands for priority `p`.
#[derive(Debug, Clone, Copy)]
pub struct PrioTable {
    bitmap: [u32; PRIO_TBL_SIZE],
}

impl PrioTable {
    pub const fn new() -> Self {
        PrioTable {
            bitmap: [0; PRIO_TBL_SIZE],
        }
    }

    /// Insert a priority into the bitmap
    #[inline]
    pub fn insert(&mut self, prio: Prio) {
        debug_assert!((prio as usize) < CFG_PRIO_LEVELS);
        self.bitmap[prio as usize / 32] |= 1 << (prio % 32);
    }

    /// Remove a priority from the bitmap
    #[inline]
    pub fn remove(&mut self, prio: Prio) {
        debug_assert!((prio as usize) < CFG_PRIO_LEVELS);
        self.bitmap[prio as usize / 32] &= !(1 << (prio % 32));
    }

    /// Get the highest priority, `NOPRIO` when empty
    #[inline]
    pub fn get_highest(&self) -> Prio {
        for (idx, &word) in self.bitmap.iter().enumerate().rev() {
            if word != 0 {
                return (idx * 32 + 31 - word.leading_zeros() as usize) as Prio;
            }
        }
        NOPRIO
    }

    /// Check if a specific priority has any ready threads
    #[inline]
    pub fn is_set(&self, prio: Prio) -> bool {
        (self.bitmap[prio as usize / 32] & (1 << (prio % 32))) != 0
    }

    /// Check if the priority table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&w| w == 0)
    }
}

impl Default for PrioTable {
    fn default() -> Self {
        Self::new()
    }
}
