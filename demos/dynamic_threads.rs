//! Dynamic threads - workers on heap-allocated working areas
//!
//! Results go out over semihosting, so run it under a debugger or QEMU.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use cortex_m_semihosting::hprintln;

use chrt::{
    CortexM4Port, Heap, IdleWorkingArea, Kernel, KernelConfig, KernelHeapLock, MemCore, WorkingArea, LOWPRIO,
    NORMALPRIO,
};

static KERNEL: Kernel<CortexM4Port> = Kernel::new(CortexM4Port::new(16_000_000), KernelConfig::DEFAULT);
static IDLE_WA: IdleWorkingArea = IdleWorkingArea::new();

static ARENA: WorkingArea<8192> = WorkingArea::new();
static CORE: MemCore = MemCore::new();
static HEAP: Heap<KernelHeapLock<'static, CortexM4Port>> = Heap::with_provider(KernelHeapLock::new(&KERNEL), &CORE);

#[exception]
fn SysTick() {
    KERNEL.tick_from_isr();
}

/// Sum `1..=n` slowly, exiting with the result
fn worker(arg: *mut ()) -> ! {
    let n = arg as usize as i32;
    let mut sum = 0;
    for i in 1..=n {
        sum += i;
        KERNEL.sleep(1);
    }
    KERNEL.exit(sum)
}

/// Never joined, the main loop reaps it
fn fire_and_forget(_: *mut ()) -> ! {
    KERNEL.sleep_ms(10);
    KERNEL.exit(0)
}

#[entry]
fn main() -> ! {
    unsafe { CORE.init(ARENA.area()) };
    KERNEL.init(&IDLE_WA);
    KERNEL.start();

    let mut round = 0u32;
    loop {
        let workers: [_; 3] = core::array::from_fn(|i| {
            let n = (i + 1) * 10;
            KERNEL.create_from_heap(&HEAP, 1024, "worker", NORMALPRIO - 1, worker, n as *mut ())
        });
        for (i, w) in workers.into_iter().enumerate() {
            match w {
                Ok(id) => {
                    let sum = KERNEL.wait_for_exit(id);
                    hprintln!("round {} worker {}: {}", round, i, sum);
                }
                Err(e) => hprintln!("round {} worker {} failed: {:?}", round, i, e),
            }
        }

        if let Ok(id) = KERNEL.create_from_heap(&HEAP, 512, "detached", LOWPRIO, fire_and_forget, core::ptr::null_mut()) {
            KERNEL.release(id);
        }
        KERNEL.sleep_ms(50);
        let reaped = KERNEL.reap_detached();

        let st = HEAP.status();
        hprintln!(
            "round {}: reaped {}, heap {} fragments, {} free, core {} left",
            round,
            reaped,
            st.fragments,
            st.total,
            CORE.free_bytes()
        );
        round += 1;
        KERNEL.sleep_ms(1000);
    }
}
