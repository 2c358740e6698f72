//! Core RTOS modules
//!
//! Kernel object, scheduler, threads, time and the shared definitions
//! they build on.

pub mod config;
pub mod critical;
pub mod cs_cell;
pub mod debug;
pub mod error;
pub mod kernel;
pub mod list;
pub mod prio;
pub mod sched;
pub mod thread;
pub mod time;
pub mod types;
