//! Synchronization primitives
//!
//! Counting and binary semaphores, plus the generic wait queue other
//! primitives build on.

pub mod queue;

#[cfg(feature = "sem")]
pub mod sem;

#[cfg(feature = "sem")]
pub mod bsem;
