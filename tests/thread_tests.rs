//! Thread lifecycle tests on the host simulator

mod common;

use chrt::{
    Heap, KernelConfig, KernelHeapLock, MemoryArea, Msg, OsError, QueuePolicy, ThreadDescriptor, ThreadId,
    ThreadReference, ThreadState, Timeout, WorkingArea, HIGHPRIO, IDLEPRIO, LOWPRIO, NOPRIO, NORMALPRIO,
};
use common::{arg, boot, boot_default, from_arg, leak, working_area, HostKernel, HostPort, Trace};

struct Env {
    kernel: &'static HostKernel,
    trace: &'static Trace,
    tag: &'static str,
    code: i32,
}

fn env(kernel: &'static HostKernel, trace: &'static Trace, tag: &'static str, code: i32) -> *mut () {
    arg(leak(Env { kernel, trace, tag, code }))
}

/// Record the tag, then exit with the configured code
fn recorder(a: *mut ()) -> ! {
    let e: &Env = unsafe { from_arg(a) };
    e.trace.push(e.tag);
    e.kernel.exit(e.code)
}

// ============ Creation ============

#[test]
fn test_create_suspended_then_start() {
    let kernel = boot_default();
    let trace = Trace::new();

    let desc = ThreadDescriptor::new("late", working_area(), NORMALPRIO + 1, recorder, env(kernel, trace, "late", 5));
    let id = kernel.create_suspended(&desc).unwrap();
    assert!(trace.events().is_empty());
    assert_eq!(kernel.thread_info(id).state, ThreadState::WaitingStart);

    kernel.start_thread(id);
    assert_eq!(trace.joined(), "late");
    assert_eq!(kernel.thread_info(id).state, ThreadState::Final);
    assert_eq!(kernel.wait_for_exit(id), 5);
}

#[test]
fn test_lower_priority_thread_waits_its_turn() {
    let kernel = boot_default();
    let trace = Trace::new();

    let desc = ThreadDescriptor::new("low", working_area(), NORMALPRIO - 1, recorder, env(kernel, trace, "low", 0));
    let id = kernel.create_running(&desc).unwrap();
    assert!(trace.events().is_empty());
    assert_eq!(kernel.thread_info(id).state, ThreadState::Ready);

    assert_eq!(kernel.wait_for_exit(id), 0);
    assert_eq!(trace.joined(), "low");
}

#[test]
fn test_create_rejects_bad_descriptors() {
    let kernel = boot_default();
    let trace = Trace::new();
    let a = env(kernel, trace, "bad", 0);

    let desc = ThreadDescriptor::new("bad", working_area(), NOPRIO, recorder, a);
    assert_eq!(kernel.create_suspended(&desc), Err(OsError::PrioInvalid));

    let desc = ThreadDescriptor::new("bad", working_area(), HIGHPRIO + 1, recorder, a);
    assert_eq!(kernel.create_suspended(&desc), Err(OsError::PrioInvalid));

    let tiny: &'static WorkingArea<64> = leak(WorkingArea::new());
    let desc = ThreadDescriptor::new("bad", tiny, NORMALPRIO, recorder, a);
    assert_eq!(kernel.create_suspended(&desc), Err(OsError::WorkingAreaTooSmall));

    let wa = working_area().area();
    let skewed = MemoryArea::new(wa.base.wrapping_add(8), 512);
    let desc = unsafe { ThreadDescriptor::from_area("bad", skewed, NORMALPRIO, recorder, a) };
    assert_eq!(kernel.create_suspended(&desc), Err(OsError::WorkingAreaMisaligned));

    assert!(trace.events().is_empty());
}

#[test]
fn test_arena_exhaustion() {
    let kernel = boot_default();
    let trace = Trace::new();
    let a = env(kernel, trace, "filler", 0);

    // main and idle already hold two slots
    let mut created = 0;
    let err = loop {
        let wa: &'static WorkingArea<128> = leak(WorkingArea::new());
        let desc = ThreadDescriptor::new("filler", wa, LOWPRIO, recorder, a);
        match kernel.create_suspended(&desc) {
            Ok(_) => created += 1,
            Err(err) => break err,
        }
    };
    assert_eq!(err, OsError::NoFreeThreadSlot);
    assert_eq!(created, chrt::config::CFG_THREADS_MAX - 2);
}

#[test]
#[should_panic(expected = "working area in use")]
fn test_shared_working_area_halts() {
    let kernel = boot_default();
    let trace = Trace::new();
    let wa = working_area();

    let desc = ThreadDescriptor::new("one", wa, LOWPRIO, recorder, env(kernel, trace, "one", 0));
    kernel.create_suspended(&desc).unwrap();
    let desc = ThreadDescriptor::new("two", wa, LOWPRIO, recorder, env(kernel, trace, "two", 0));
    let _ = kernel.create_suspended(&desc);
}

#[test]
#[should_panic(expected = "wrong state")]
fn test_start_running_thread_halts() {
    let kernel = boot_default();
    kernel.start_thread(kernel.current_thread());
}

// ============ Termination ============

#[test]
fn test_exit_disposes_after_last_reference() {
    let kernel = boot_default();
    let trace = Trace::new();

    let desc = ThreadDescriptor::new("short", working_area(), NORMALPRIO + 1, recorder, env(kernel, trace, "short", 42));
    let id = kernel.create_running(&desc).unwrap();
    assert_eq!(kernel.thread_info(id).state, ThreadState::Final);

    assert_eq!(kernel.wait_for_exit(id), 42);

    let mut names = Vec::new();
    kernel.for_each_thread(|info| names.push(info.name));
    assert_eq!(names, vec!["main", "idle"]);
}

#[test]
#[should_panic(expected = "stale thread handle")]
fn test_disposed_handle_halts() {
    let kernel = boot_default();
    let trace = Trace::new();

    let desc = ThreadDescriptor::new("gone", working_area(), NORMALPRIO + 1, recorder, env(kernel, trace, "gone", 0));
    let id = kernel.create_running(&desc).unwrap();
    kernel.wait_for_exit(id);
    kernel.thread_info(id);
}

#[test]
#[should_panic(expected = "waiting for self")]
fn test_wait_for_self_halts() {
    let kernel = boot_default();
    kernel.wait_for_exit(kernel.current_thread());
}

struct Watcher {
    kernel: &'static HostKernel,
    trace: &'static Trace,
    target: ThreadId,
    tag: &'static str,
}

fn watcher(a: *mut ()) -> ! {
    let w: &Watcher = unsafe { from_arg(a) };
    let code = w.kernel.wait_for_exit(w.target);
    w.trace.push(format!("{}:{}", w.tag, code));
    w.kernel.exit(0)
}

#[test]
fn test_exit_code_reaches_every_waiter() {
    let kernel = boot_default();
    let trace = Trace::new();

    // Runs only once every other thread sleeps
    let desc = ThreadDescriptor::new("target", working_area(), LOWPRIO, recorder, env(kernel, trace, "target", 7));
    let target = kernel.create_running(&desc).unwrap();

    let watchers: Vec<_> = ["w1", "w2"]
        .into_iter()
        .map(|tag| {
            let target = kernel.add_ref(target);
            let w = leak(Watcher { kernel, trace, target, tag });
            let desc = ThreadDescriptor::new(tag, working_area(), NORMALPRIO + 1, watcher, arg(w));
            kernel.create_running(&desc).unwrap()
        })
        .collect();
    assert_eq!(kernel.thread_info(target).refs, 3);

    assert_eq!(kernel.wait_for_exit(target), 7);
    assert_eq!(trace.events(), vec!["target", "w1:7", "w2:7"]);

    for id in watchers {
        assert_eq!(kernel.wait_for_exit(id), 0);
    }
}

#[test]
fn test_exit_waiters_wake_by_priority() {
    for policy in [QueuePolicy::Priority, QueuePolicy::Fifo] {
        let kernel = boot(KernelConfig::DEFAULT.with_queue_policy(policy));
        let trace = Trace::new();

        let desc = ThreadDescriptor::new("target", working_area(), LOWPRIO, recorder, env(kernel, trace, "target", 9));
        let target = kernel.create_running(&desc).unwrap();

        let watchers: Vec<_> = [("lo", 1), ("hi", 3), ("mid", 2)]
            .into_iter()
            .map(|(tag, boost)| {
                let target = kernel.add_ref(target);
                let w = leak(Watcher { kernel, trace, target, tag });
                let desc = ThreadDescriptor::new(tag, working_area(), NORMALPRIO + boost, watcher, arg(w));
                kernel.create_running(&desc).unwrap()
            })
            .collect();

        assert_eq!(kernel.wait_for_exit(target), 9);
        assert_eq!(trace.events(), vec!["target", "hi:9", "mid:9", "lo:9"]);
        for id in watchers {
            assert_eq!(kernel.wait_for_exit(id), 0);
        }
    }
}

// ============ Registry ============

#[test]
fn test_registry_lookup() {
    let kernel = boot_default();
    let trace = Trace::new();

    let desc = ThreadDescriptor::new("worker", working_area(), LOWPRIO, recorder, env(kernel, trace, "worker", 0));
    let id = kernel.create_suspended(&desc).unwrap();

    let mut seen = Vec::new();
    kernel.for_each_thread(|info| seen.push((info.name, info.prio, info.state)));
    assert_eq!(
        seen,
        vec![
            ("main", NORMALPRIO, ThreadState::Running),
            ("idle", IDLEPRIO, ThreadState::Ready),
            ("worker", LOWPRIO, ThreadState::WaitingStart),
        ]
    );

    let found = kernel.find_thread_by_name("worker").unwrap();
    assert_eq!(found, id);
    assert_eq!(kernel.thread_info(id).refs, 2);
    kernel.release(found);
    assert_eq!(kernel.thread_info(id).refs, 1);

    assert!(kernel.find_thread_by_name("nobody").is_none());
}

#[test]
fn test_stack_unused_on_fresh_area() {
    let kernel = boot_default();
    let trace = Trace::new();

    let desc = ThreadDescriptor::new("fresh", working_area(), LOWPRIO, recorder, env(kernel, trace, "fresh", 0));
    let id = kernel.create_suspended(&desc).unwrap();

    // The host port keeps its frames off the working area
    assert_eq!(kernel.stack_unused(id), 1024);
}

#[test]
#[should_panic(expected = "stack filling disabled")]
fn test_stack_unused_needs_filling() {
    let kernel = boot(KernelConfig::DEFAULT.with_fill_stacks(false));
    kernel.stack_unused(kernel.current_thread());
}

// ============ Priority and yielding ============

#[test]
fn test_lowering_priority_yields() {
    let kernel = boot_default();
    let trace = Trace::new();

    let desc = ThreadDescriptor::new("mid", working_area(), NORMALPRIO - 1, recorder, env(kernel, trace, "mid", 0));
    let id = kernel.create_running(&desc).unwrap();
    assert!(trace.events().is_empty());

    let old = kernel.set_priority(NORMALPRIO - 2);
    assert_eq!(old, NORMALPRIO);
    assert_eq!(trace.joined(), "mid");

    assert_eq!(kernel.set_priority(old), NORMALPRIO - 2);
    assert_eq!(kernel.wait_for_exit(id), 0);
}

#[test]
#[should_panic(expected = "invalid priority")]
fn test_set_priority_rejects_noprio() {
    let kernel = boot_default();
    kernel.set_priority(NOPRIO);
}

fn yielder(a: *mut ()) -> ! {
    let e: &Env = unsafe { from_arg(a) };
    for _ in 0..2 {
        e.trace.push(e.tag);
        e.kernel.yield_now();
    }
    e.kernel.exit(0)
}

#[test]
fn test_yield_alternates_peers() {
    let kernel = boot(KernelConfig::DEFAULT.with_time_quantum(0));
    let trace = Trace::new();

    let a = ThreadDescriptor::new("a", working_area(), NORMALPRIO, yielder, env(kernel, trace, "a", 0));
    let b = ThreadDescriptor::new("b", working_area(), NORMALPRIO, yielder, env(kernel, trace, "b", 0));
    let a = kernel.create_running(&a).unwrap();
    let b = kernel.create_running(&b).unwrap();
    assert!(trace.events().is_empty());

    kernel.wait_for_exit(a);
    kernel.wait_for_exit(b);
    assert_eq!(trace.joined(), "abab");
}

// ============ Delays ============

#[test]
fn test_sleep_durations() {
    let kernel = boot_default();

    let t0 = kernel.now();
    kernel.sleep(0);
    assert_eq!(kernel.now(), t0);

    kernel.sleep(5);
    assert_eq!(kernel.now(), t0 + 5);

    kernel.sleep_ms(3);
    assert_eq!(kernel.now(), t0 + 8);

    kernel.sleep_until(t0 + 12);
    assert_eq!(kernel.now(), t0 + 12);
}

#[test]
fn test_sleep_until_windowed() {
    let kernel = boot_default();

    let start = kernel.now();
    let next = kernel.sleep_until_windowed(start, start + 4);
    assert_eq!(next, start + 4);
    assert_eq!(kernel.now(), start + 4);

    // Outside the window the call returns at once
    let next = kernel.sleep_until_windowed(start, start + 2);
    assert_eq!(next, start + 2);
    assert_eq!(kernel.now(), start + 4);
}

struct Polite {
    kernel: &'static HostKernel,
    trace: &'static Trace,
}

fn polite(a: *mut ()) -> ! {
    let p: &Polite = unsafe { from_arg(a) };
    let mut rounds = 0;
    while !p.kernel.should_terminate() {
        rounds += 1;
        p.kernel.sleep(1);
    }
    p.trace.push("stopped");
    p.kernel.exit(rounds)
}

#[test]
fn test_terminate_request() {
    let kernel = boot_default();
    let trace = Trace::new();
    let p = leak(Polite { kernel, trace });

    let desc = ThreadDescriptor::new("polite", working_area(), NORMALPRIO + 1, polite, arg(p));
    let id = kernel.create_running(&desc).unwrap();

    kernel.sleep(3);
    kernel.request_terminate(id);
    assert!(!kernel.should_terminate());

    assert!(kernel.wait_for_exit(id) >= 3);
    assert_eq!(trace.joined(), "stopped");
}

// ============ Thread references ============

struct Parker {
    kernel: &'static HostKernel,
    reference: &'static ThreadReference,
    timeout: Timeout,
}

fn parker(a: *mut ()) -> ! {
    let p: &Parker = unsafe { from_arg(a) };
    let msg = {
        let mut lock = p.kernel.lock();
        p.reference.suspend_timeout_s(&mut lock, p.timeout)
    };
    p.kernel.exit(i32::from(msg))
}

#[test]
fn test_reference_resume() {
    let kernel = boot_default();
    let reference = leak(ThreadReference::new());
    let p = leak(Parker { kernel, reference, timeout: Timeout::Infinite });

    let desc = ThreadDescriptor::new("parker", working_area(), NORMALPRIO + 1, parker, arg(p));
    let id = kernel.create_running(&desc).unwrap();
    assert!(!reference.is_empty_i(&kernel.lock()));

    reference.resume(kernel, Msg::Value(5));
    assert!(reference.is_empty_i(&kernel.lock()));
    assert_eq!(kernel.wait_for_exit(id), 5);

    // Nobody parked, nothing happens
    reference.resume(kernel, Msg::Ok);
}

#[test]
fn test_reference_timeout_empties_slot() {
    let kernel = boot_default();
    let reference = leak(ThreadReference::new());
    let p = leak(Parker { kernel, reference, timeout: Timeout::After(3) });

    let desc = ThreadDescriptor::new("parker", working_area(), NORMALPRIO + 1, parker, arg(p));
    let id = kernel.create_running(&desc).unwrap();

    let t0 = kernel.now();
    assert_eq!(kernel.wait_for_exit(id), i32::from(Msg::Timeout));
    assert_eq!(kernel.now(), t0 + 3);
    assert!(reference.is_empty_i(&kernel.lock()));
}

#[test]
fn test_reference_resume_from_isr() {
    let kernel = boot_default();
    let reference = leak(ThreadReference::new());
    let p = leak(Parker { kernel, reference, timeout: Timeout::Infinite });

    let desc = ThreadDescriptor::new("parker", working_area(), NORMALPRIO + 1, parker, arg(p));
    let id = kernel.create_running(&desc).unwrap();

    kernel.isr(|lock| reference.resume_i(lock, Msg::Value(9)));
    assert_eq!(kernel.thread_info(id).state, ThreadState::Final);
    assert_eq!(kernel.wait_for_exit(id), 9);
}

#[test]
#[should_panic(expected = "misplaced lock")]
fn test_nested_lock_halts() {
    let kernel = boot_default();
    let _outer = kernel.lock();
    let _inner = kernel.lock();
}

// ============ Heap-backed threads ============

type HostHeap = Heap<KernelHeapLock<'static, HostPort>>;

fn heap_for(kernel: &'static HostKernel) -> &'static HostHeap {
    let heap: &'static HostHeap = leak(Heap::new(KernelHeapLock::new(kernel)));
    let region: &'static WorkingArea<8192> = leak(WorkingArea::new());
    unsafe { heap.init(region.area()) };
    heap
}

#[test]
fn test_heap_thread_returns_its_area() {
    let kernel = boot_default();
    let trace = Trace::new();
    let heap = heap_for(kernel);
    let fresh = heap.status();

    let id = kernel
        .create_from_heap(heap, 1024, "dyn", NORMALPRIO + 1, recorder, env(kernel, trace, "dyn", 3))
        .unwrap();
    assert_eq!(trace.joined(), "dyn");
    assert!(heap.status().total < fresh.total);

    assert_eq!(kernel.wait_for_exit(id), 3);
    assert_eq!(heap.status(), fresh);
    assert!(!heap.integrity_check());
}

#[test]
fn test_detached_heap_thread_is_reaped() {
    let kernel = boot_default();
    let trace = Trace::new();
    let heap = heap_for(kernel);
    let fresh = heap.status();

    let id = kernel
        .create_from_heap(heap, 1024, "detached", NORMALPRIO - 1, recorder, env(kernel, trace, "detached", 0))
        .unwrap();
    kernel.release(id);
    assert_eq!(kernel.reap_detached(), 0);

    // Let it run to completion
    kernel.sleep(1);
    assert_eq!(trace.joined(), "detached");
    assert_ne!(heap.status(), fresh);

    assert_eq!(kernel.reap_detached(), 1);
    assert_eq!(heap.status(), fresh);

    let mut names = Vec::new();
    kernel.for_each_thread(|info| names.push(info.name));
    assert_eq!(names, vec!["main", "idle"]);
}

#[test]
fn test_heap_thread_out_of_memory() {
    let kernel = boot_default();
    let trace = Trace::new();
    let heap = heap_for(kernel);

    let err = kernel
        .create_from_heap(heap, 1 << 20, "huge", NORMALPRIO, recorder, env(kernel, trace, "huge", 0))
        .unwrap_err();
    assert_eq!(err, OsError::OutOfMemory);

    let err = kernel
        .create_from_heap(heap, usize::MAX, "wrap", NORMALPRIO, recorder, env(kernel, trace, "wrap", 0))
        .unwrap_err();
    assert_eq!(err, OsError::OutOfMemory);
    assert!(trace.events().is_empty());
}
