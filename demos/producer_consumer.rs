//! Producer-Consumer example with semaphores

#![no_std]
#![no_main]

use core::ptr::null_mut;
use core::sync::atomic::{AtomicU32, Ordering};

use chrt::{
    CortexM4Port, IdleWorkingArea, Kernel, KernelConfig, Msg, Semaphore, ThreadDescriptor, Timeout, WorkingArea,
    NORMALPRIO,
};
use cortex_m_rt::{entry, exception};

static KERNEL: Kernel<CortexM4Port> = Kernel::new(CortexM4Port::new(16_000_000), KernelConfig::DEFAULT);
static IDLE_WA: IdleWorkingArea = IdleWorkingArea::new();

static PRODUCER_WA: WorkingArea<1024> = WorkingArea::new();
static CONSUMER_WA: WorkingArea<1024> = WorkingArea::new();

static PRODUCED: AtomicU32 = AtomicU32::new(0);
static CONSUMED: AtomicU32 = AtomicU32::new(0);

/// One permit per produced item
static ITEMS: Semaphore = Semaphore::new(0);

#[exception]
fn SysTick() {
    KERNEL.tick_from_isr();
}

fn producer(_: *mut ()) -> ! {
    loop {
        let n = PRODUCED.fetch_add(1, Ordering::Relaxed) + 1;
        ITEMS.signal(&KERNEL);
        chrt::info!("[P] produced #{}", n);
        KERNEL.sleep_ms(200);
    }
}

fn consumer(_: *mut ()) -> ! {
    loop {
        match ITEMS.wait_timeout(&KERNEL, Timeout::After(KERNEL.config().ms_to_ticks(1000))) {
            Msg::Ok => {
                let n = CONSUMED.fetch_add(1, Ordering::Relaxed) + 1;
                chrt::info!("[C] consumed #{}", n);
            }
            Msg::Timeout => {
                chrt::warn!("[C] producer stalled");
            }
            _ => {}
        }
    }
}

#[entry]
fn main() -> ! {
    chrt::info!("Producer-Consumer Demo");

    KERNEL.init(&IDLE_WA);
    KERNEL
        .create_running(&ThreadDescriptor::new("P", &PRODUCER_WA, NORMALPRIO + 1, producer, null_mut()))
        .expect("producer failed");
    KERNEL
        .create_running(&ThreadDescriptor::new("C", &CONSUMER_WA, NORMALPRIO + 2, consumer, null_mut()))
        .expect("consumer failed");

    chrt::info!("Starting...");
    KERNEL.start();

    loop {
        KERNEL.sleep_ms(1000);
        chrt::info!(
            "backlog {}",
            PRODUCED.load(Ordering::Relaxed) - CONSUMED.load(Ordering::Relaxed)
        );
    }
}
