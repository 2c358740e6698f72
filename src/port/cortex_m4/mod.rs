//! Cortex-M4 port
//!
//! Threads run on PSP, exceptions on a dedicated MSP stack. The kernel
//! lock masks interrupts through PRIMASK, SysTick drives the system tick
//! and PendSV performs the context switch.
//!
//! The application routes SysTick into the kernel:
//! ```ignore
//! #[exception]
//! fn SysTick() {
//!     KERNEL.tick_from_isr();
//! }
//! ```

use core::arch::{asm, naked_asm};
use core::mem::size_of;
use core::ptr::{addr_of, addr_of_mut, null, null_mut};

use cortex_m::peripheral::scb::{SystemHandler, VectActive};
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;

use crate::config::KernelConfig;
use crate::core::debug::halt;
use crate::port::{Context, Port};
use crate::types::{align_down, MemoryArea, ThreadFn};

// ============ Critical Section ============

mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

/// Words of the exception stack
const EXCEPTION_STACK_WORDS: usize = 256;

/// Stack used by every exception handler
static mut EXCEPTION_STACK: [u64; EXCEPTION_STACK_WORDS] = [0; EXCEPTION_STACK_WORDS];

/// Switch requested but not yet performed by PendSV
#[repr(C)]
struct PendingSwitch {
    from: *mut Context,
    to: *const Context,
}

static mut PENDING: PendingSwitch = PendingSwitch {
    from: null_mut(),
    to: null(),
};

/// Frame found at the saved stack pointer of a suspended thread
#[repr(C, align(4))]
struct ThreadFrame {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    /// EXC_RETURN used by PendSV
    exc_return: u32,
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}

/// Return to thread mode on PSP, no FPU frame
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Thumb state bit
const XPSR_T: u32 = 0x0100_0000;

/// Cortex-M4 port, clocked at `core_clock_hz`
pub struct CortexM4Port {
    core_clock_hz: u32,
}

impl CortexM4Port {
    pub const fn new(core_clock_hz: u32) -> Self {
        CortexM4Port { core_clock_hz }
    }
}

impl Port for CortexM4Port {
    const STACK_ALIGN: usize = 8;
    const WORKING_AREA_ALIGN: usize = 8;
    const CONTEXT_SIZE: usize = size_of::<ThreadFrame>();
    const MIN_WORKING_AREA: usize = 256;

    #[inline(always)]
    fn enter_critical(&self) {
        cortex_m::interrupt::disable();
    }

    #[inline(always)]
    fn exit_critical(&self) {
        unsafe { cortex_m::interrupt::enable() }
    }

    fn init_main(&self, ctx: &mut Context) {
        let top = addr_of!(EXCEPTION_STACK) as u32 + (EXCEPTION_STACK_WORDS * size_of::<u64>()) as u32;

        unsafe {
            let mut scb = cortex_m::Peripherals::steal().SCB;
            scb.set_priority(SystemHandler::PendSV, 0xF0);
            scb.set_priority(SystemHandler::SysTick, 0xF0);

            // Keep running on the current stack, now as PSP, and move
            // exceptions to their own stack
            asm!(
                "mrs {tmp}, msp",
                "msr psp, {tmp}",
                "mrs {tmp}, control",
                "orr {tmp}, {tmp}, #2",
                "msr control, {tmp}",
                "isb",
                "msr msp, {top}",
                tmp = out(reg) _,
                top = in(reg) top,
            );
        }
        ctx.sp = 0;
    }

    unsafe fn init_context(&self, ctx: &mut Context, area: MemoryArea, entry: ThreadFn, arg: *mut ()) {
        let top = align_down(area.end(), Self::STACK_ALIGN);
        let offset = top - Self::CONTEXT_SIZE - area.start();
        let frame: *mut ThreadFrame = area.base.wrapping_add(offset).cast();

        // SAFETY: the frame lies inside the area, which the caller owns.
        unsafe {
            frame.write(ThreadFrame {
                r4: 0x0404_0404,
                r5: 0x0505_0505,
                r6: 0x0606_0606,
                r7: 0x0707_0707,
                r8: 0x0808_0808,
                r9: 0x0909_0909,
                r10: 0x1010_1010,
                r11: 0x1111_1111,
                exc_return: EXC_RETURN_THREAD_PSP,
                r0: arg as u32,
                r1: 0,
                r2: 0,
                r3: 0,
                r12: 0,
                lr: thread_return as *const () as u32,
                pc: (entry as usize as u32) | 1,
                xpsr: XPSR_T,
            });
        }
        ctx.sp = frame as usize;
    }

    unsafe fn switch(&self, from: *mut Context, to: *const Context) {
        // SAFETY: interrupts are masked by the kernel lock.
        unsafe {
            let pending = addr_of_mut!(PENDING);
            // A switch already pending keeps the context really running
            if (*pending).to.is_null() {
                (*pending).from = from;
            }
            (*pending).to = to;
        }
        SCB::set_pendsv();

        if SCB::vect_active() == VectActive::ThreadMode {
            // PendSV runs as soon as interrupts are unmasked; we come back
            // here once this thread is switched in again
            unsafe { cortex_m::interrupt::enable() };
            cortex_m::asm::isb();
            cortex_m::interrupt::disable();
        }
    }

    fn arm_tick(&self, config: &KernelConfig) {
        let mut p = unsafe { cortex_m::Peripherals::steal() };

        p.SYST.set_reload(self.core_clock_hz / config.tick_rate_hz - 1);
        p.SYST.clear_current();
        p.SYST.set_clock_source(SystClkSource::Core);
        p.SYST.enable_interrupt();
        p.SYST.enable_counter();
    }

    #[inline(always)]
    fn idle_hook(&self) {
        cortex_m::asm::wfi();
    }

    #[inline(always)]
    fn stack_pointer(&self) -> Option<usize> {
        Some(cortex_m::register::psp::read() as usize)
    }
}

/// Called from PendSV with the outgoing PSP, returns the incoming one
#[no_mangle]
unsafe extern "C" fn pendsv_switch(sp: usize) -> usize {
    // SAFETY: PendSV runs with interrupts masked; the contexts live in
    // the kernel thread arena.
    unsafe {
        let pending = addr_of_mut!(PENDING);
        let from = (*pending).from;
        let to = (*pending).to;
        (*pending).from = null_mut();
        (*pending).to = null();

        if to.is_null() {
            return sp;
        }
        (*from).sp = sp;
        (*to).sp
    }
}

/// PendSV exception handler
///
/// 1. Push R4-R11 and EXC_RETURN on the outgoing PSP
/// 2. Swap stack pointers through `pendsv_switch`
/// 3. Pop the same registers from the incoming PSP and return
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11, lr}}",
        "bl {switch}",
        "ldmia r0!, {{r4-r11, lr}}",
        "msr psp, r0",
        "cpsie i",
        "dsb",
        "isb",
        "bx lr",
        switch = sym pendsv_switch,
    );
}

/// Landing pad for a thread entry that returns
fn thread_return() -> ! {
    halt("thread returned")
}
