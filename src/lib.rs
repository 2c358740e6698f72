//! ChibiOS-style RTOS kernel core in Rust
//!
//! A real-time kernel for single-core microcontrollers providing:
//! - Priority-based preemptive scheduling with optional round robin
//! - Counting and binary semaphores over priority or FIFO wait lists
//! - Thread lifecycle with exit codes, references and a thread registry
//! - A first-fit, alignment-aware heap over a core allocator
//! - Context switching for ARM Cortex-M4
//!
//! # Example
//! ```ignore
//! static KERNEL: Kernel<CortexM4Port> = Kernel::new(CortexM4Port::new(84_000_000), KernelConfig::DEFAULT);
//! static IDLE_WA: IdleWorkingArea = IdleWorkingArea::new();
//!
//! #[entry]
//! fn main() -> ! {
//!     KERNEL.init(&IDLE_WA);
//!     KERNEL.create_running(&worker_descriptor()).unwrap();
//!     KERNEL.start();
//!     loop {
//!         KERNEL.sleep_ms(1000);
//!     }
//! }
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
#[cfg(feature = "heap")]
pub mod mem;
pub mod port;
pub mod sync;

// ============ Re-exports ============

pub use crate::core::{config, critical, debug, error, kernel, prio, sched, thread, time, types};

pub use crate::core::config::{KernelConfig, QueuePolicy};
pub use crate::core::debug::CheckLevel;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::kernel::{IdleWorkingArea, Kernel, SysLock};
pub use crate::core::thread::{ThreadDescriptor, ThreadId, ThreadInfo, ThreadReference, WorkingArea};
pub use crate::core::types::*;
pub use crate::port::{Context, Port};

pub use crate::sync::queue::WaitQueue;
#[cfg(feature = "sem")]
pub use crate::sync::bsem::BinarySemaphore;
#[cfg(feature = "sem")]
pub use crate::sync::sem::Semaphore;

#[cfg(feature = "heap")]
pub use crate::mem::core_alloc::MemCore;
#[cfg(feature = "heap")]
pub use crate::mem::heap::{CsHeapLock, Heap, HeapLock, HeapStatus, KernelHeapLock};
#[cfg(feature = "heap")]
pub use crate::mem::MemoryProvider;

#[cfg(target_arch = "arm")]
pub use crate::port::cortex_m4::CortexM4Port;
