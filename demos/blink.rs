//! Blink Example - LED blinking using RTOS on STM32F401

#![no_std]
#![no_main]

use core::ptr::{null_mut, write_volatile};

use chrt::{CortexM4Port, IdleWorkingArea, Kernel, KernelConfig, ThreadDescriptor, WorkingArea, NORMALPRIO};
use cortex_m_rt::{entry, exception};

// ============ Kernel ============

static KERNEL: Kernel<CortexM4Port> = Kernel::new(CortexM4Port::new(16_000_000), KernelConfig::DEFAULT);
static IDLE_WA: IdleWorkingArea = IdleWorkingArea::new();

static BLINK_WA: WorkingArea<1024> = WorkingArea::new();
static REPORT_WA: WorkingArea<1024> = WorkingArea::new();

#[exception]
fn SysTick() {
    KERNEL.tick_from_isr();
}

// ============ LED Control ============

// Nucleo-F401RE user LED on PA5
const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
const GPIOA_MODER: *mut u32 = 0x4002_0000 as *mut u32;
const GPIOA_BSRR: *mut u32 = 0x4002_0018 as *mut u32;

fn led_init() {
    unsafe {
        write_volatile(RCC_AHB1ENR, 1);
        write_volatile(GPIOA_MODER, 0xA800_0000 | (1 << 10));
    }
}

fn led_on() {
    unsafe { write_volatile(GPIOA_BSRR, 1 << 5) }
}

fn led_off() {
    unsafe { write_volatile(GPIOA_BSRR, 1 << (5 + 16)) }
}

// ============ Threads ============

fn blink(_: *mut ()) -> ! {
    chrt::info!("blink thread started");
    loop {
        led_on();
        chrt::info!("LED ON");
        KERNEL.sleep_ms(500);

        led_off();
        chrt::info!("LED OFF");
        KERNEL.sleep_ms(500);
    }
}

fn report(_: *mut ()) -> ! {
    loop {
        KERNEL.for_each_thread(|t| {
            chrt::info!("{} prio {} ran {} ticks", t.name, t.prio, t.runtime);
        });
        KERNEL.sleep_ms(5000);
    }
}

// ============ Main ============

#[entry]
fn main() -> ! {
    led_init();

    KERNEL.init(&IDLE_WA);

    KERNEL
        .create_running(&ThreadDescriptor::new("blink", &BLINK_WA, NORMALPRIO + 1, blink, null_mut()))
        .expect("blink thread failed");
    KERNEL
        .create_running(&ThreadDescriptor::new("report", &REPORT_WA, NORMALPRIO - 1, report, null_mut()))
        .expect("report thread failed");

    chrt::info!("starting kernel");
    KERNEL.start();

    loop {
        KERNEL.sleep_ms(1000);
    }
}
