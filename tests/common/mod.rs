//! Host simulator shared by the integration tests
//!
//! Every kernel thread runs on its own std thread, but only the holder of
//! the baton executes: `switch` hands the baton to the incoming context
//! and parks the caller until it gets the baton back. The idle thread
//! drives the system tick, so time only advances while every kernel
//! thread sleeps.

#![allow(dead_code)]

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use chrt::{Context, IdleWorkingArea, Kernel, KernelConfig, MemoryArea, Port, ThreadFn, WorkingArea};

/// Idle rounds after which a test is considered stuck
const STALL_LIMIT: usize = 1_000_000;

type TickHook = Box<dyn Fn() + Send + Sync>;

pub struct HostPort {
    /// Token of the context allowed to run
    baton: Arc<(Mutex<usize>, Condvar)>,
    next_token: AtomicUsize,
    tick: OnceLock<TickHook>,
    idle_rounds: AtomicUsize,
}

impl HostPort {
    pub fn new() -> Self {
        HostPort {
            baton: Arc::new((Mutex::new(0), Condvar::new())),
            next_token: AtomicUsize::new(1),
            tick: OnceLock::new(),
            idle_rounds: AtomicUsize::new(0),
        }
    }

    fn set_tick_hook(&self, hook: TickHook) {
        if self.tick.set(hook).is_err() {
            panic!("tick hook already set");
        }
    }
}

fn wait_for(baton: &(Mutex<usize>, Condvar), token: usize) {
    let (lock, cv) = baton;
    let mut cur = lock.lock().unwrap();
    while *cur != token {
        cur = cv.wait(cur).unwrap();
    }
}

impl Port for HostPort {
    const STACK_ALIGN: usize = 16;
    const WORKING_AREA_ALIGN: usize = 16;
    const CONTEXT_SIZE: usize = 64;
    const MIN_WORKING_AREA: usize = 128;

    fn enter_critical(&self) {}

    fn exit_critical(&self) {}

    fn init_main(&self, ctx: &mut Context) {
        ctx.sp = 0;
    }

    unsafe fn init_context(&self, ctx: &mut Context, _area: MemoryArea, entry: ThreadFn, arg: *mut ()) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        ctx.sp = token;

        let baton = Arc::clone(&self.baton);
        let arg = arg as usize;
        std::thread::Builder::new()
            .name(format!("kernel-{token}"))
            .spawn(move || {
                wait_for(&baton, token);
                let result = panic::catch_unwind(AssertUnwindSafe(move || {
                    entry(arg as *mut ());
                }));
                // The baton would never come back to the test thread
                if result.is_err() {
                    eprintln!("kernel thread {token} panicked");
                } else {
                    eprintln!("kernel thread {token} returned without exiting");
                }
                std::process::abort();
            })
            .unwrap();
    }

    unsafe fn switch(&self, from: *mut Context, to: *const Context) {
        let (me, next) = unsafe { ((*from).sp, (*to).sp) };
        let (lock, cv) = &*self.baton;
        let mut cur = lock.lock().unwrap();
        *cur = next;
        cv.notify_all();
        while *cur != me {
            cur = cv.wait(cur).unwrap();
        }
    }

    fn arm_tick(&self, _config: &KernelConfig) {}

    fn idle_hook(&self) {
        let rounds = self.idle_rounds.fetch_add(1, Ordering::Relaxed);
        if rounds > STALL_LIMIT {
            eprintln!("simulation stalled, every thread waits forever");
            std::process::abort();
        }
        match self.tick.get() {
            Some(tick) => tick(),
            None => std::thread::yield_now(),
        }
    }
}

pub type HostKernel = Kernel<HostPort>;

/// Leak a value for the life of the test binary
pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Thread argument pointing at a leaked value
pub fn arg<T>(value: &'static T) -> *mut () {
    value as *const T as *mut ()
}

/// # Safety
/// `arg` must come from [`arg`] with the same `T`.
pub unsafe fn from_arg<T>(arg: *mut ()) -> &'static T {
    unsafe { &*(arg as *const T) }
}

pub fn working_area() -> &'static WorkingArea<1024> {
    leak(WorkingArea::new())
}

/// Initialize a kernel on the calling test thread, which becomes `main`
pub fn boot(config: KernelConfig) -> &'static HostKernel {
    let kernel: &'static HostKernel = leak(Kernel::new(HostPort::new(), config));
    let idle: &'static IdleWorkingArea = leak(IdleWorkingArea::new());
    kernel.init(idle);
    kernel
        .port()
        .set_tick_hook(Box::new(move || kernel.tick_from_isr()));
    kernel.start();
    kernel
}

pub fn boot_default() -> &'static HostKernel {
    boot(KernelConfig::DEFAULT)
}

/// Ordered record of what the threads of one test did
pub struct Trace(Mutex<Vec<String>>);

impl Trace {
    pub fn new() -> &'static Trace {
        leak(Trace(Mutex::new(Vec::new())))
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn joined(&self) -> String {
        self.events().concat()
    }
}

/// Deterministic pseudo-random sequence
pub struct Lcg(pub u32);

impl Lcg {
    pub fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0 >> 8
    }

    /// Value in `0..n`
    pub fn below(&mut self, n: u32) -> u32 {
        self.next() % n
    }
}
