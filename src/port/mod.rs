//! Port layer - CPU-specific capabilities the kernel builds on
//!
//! The kernel never touches the CPU directly. It asks a [`Port`] to mask
//! interrupts, to lay out the first frame of a thread, to switch between
//! saved contexts and to start the system tick.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

use crate::config::KernelConfig;
use crate::types::{MemoryArea, ThreadFn};

/// Saved execution context of a thread
///
/// Only the stack pointer lives here; the port keeps the rest of the
/// register file on the thread's own stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    pub sp: usize,
}

impl Context {
    pub const fn new() -> Self {
        Context { sp: 0 }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Hardware capabilities required by the kernel
///
/// # Locking contract
/// `enter_critical`/`exit_critical` are not nested by the kernel. `switch`
/// is always entered with the critical section held and, when the calling
/// thread is later resumed, returns with it held again.
pub trait Port {
    /// Alignment of stack pointers
    const STACK_ALIGN: usize;
    /// Alignment of working area bases and sizes
    const WORKING_AREA_ALIGN: usize;
    /// Bytes of the initial frame built by [`Port::init_context`]
    const CONTEXT_SIZE: usize;
    /// Smallest working area accepted for a thread
    const MIN_WORKING_AREA: usize;

    /// Mask the interrupts that may call into the kernel
    fn enter_critical(&self);

    /// Unmask them again
    fn exit_critical(&self);

    /// Adopt the calling flow of execution as the main thread
    fn init_main(&self, ctx: &mut Context);

    /// Build the first frame of a thread at the top of `area`
    ///
    /// # Safety
    /// `area` must be writable and owned by the new thread.
    unsafe fn init_context(&self, ctx: &mut Context, area: MemoryArea, entry: ThreadFn, arg: *mut ());

    /// Save the running context into `from` and resume `to`
    ///
    /// From interrupt context the switch may be deferred to the interrupt
    /// return.
    ///
    /// # Safety
    /// Both pointers must reference live contexts in the thread arena and
    /// `to` must have been built by `init_context`, `init_main` or a
    /// previous switch.
    unsafe fn switch(&self, from: *mut Context, to: *const Context);

    /// Start the periodic system tick
    fn arm_tick(&self, config: &KernelConfig);

    /// Called in a loop by the idle thread
    fn idle_hook(&self) {}

    /// Current stack pointer, if the port can read it
    fn stack_pointer(&self) -> Option<usize> {
        None
    }
}
