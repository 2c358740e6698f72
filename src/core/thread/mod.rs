//! Thread management module
//!
//! Creation, start, termination, exit-code hand-off, delays and
//! introspection of kernel threads.
//!
//! A thread lives in a slot of the kernel arena and runs on a working
//! area supplied by its creator, either a static [`WorkingArea`] or a
//! block taken from a heap. The creator holds one reference; the slot is
//! recycled once the thread reached its final state and every reference
//! was released.

mod reference;
pub(crate) mod tcb;

pub use reference::ThreadReference;
pub use tcb::{Thread, ThreadId, ThreadInfo};

use core::cell::UnsafeCell;

use crate::config::{CFG_STACK_FILL_VALUE, CFG_THREADS_MAX};
use crate::core::debug::{os_check, CheckScope};
use crate::error::{OsError, OsResult};
use crate::kernel::{Kernel, SysLock};
use crate::port::Port;
use crate::time::{is_in_range, time_diff};
use crate::types::{MemoryArea, Msg, Prio, SleepReason, Systime, ThreadFn, ThreadState, Ticks, Timeout, HIGHPRIO, NOPRIO};
use tcb::{Dispose, WaitTarget};

#[cfg(feature = "heap")]
use crate::mem::heap::{Heap, HeapLock};

/// Statically allocated working area of `N` bytes
///
/// # Example
/// ```ignore
/// static BLINKER_WA: WorkingArea<1024> = WorkingArea::new();
///
/// fn blinker(_: *mut ()) -> ! {
///     loop { KERNEL.sleep_ms(500); }
/// }
///
/// let desc = ThreadDescriptor::new("blinker", &BLINKER_WA, NORMALPRIO, blinker, core::ptr::null_mut());
/// KERNEL.create_running(&desc).unwrap();
/// ```
#[repr(C, align(16))]
pub struct WorkingArea<const N: usize>(UnsafeCell<[u8; N]>);

// SAFETY: the memory is only handed to the kernel, which gives it to one
// thread at a time.
unsafe impl<const N: usize> Sync for WorkingArea<N> {}

impl<const N: usize> WorkingArea<N> {
    pub const fn new() -> Self {
        WorkingArea(UnsafeCell::new([0; N]))
    }

    pub fn area(&'static self) -> MemoryArea {
        MemoryArea::new(self.0.get().cast(), N)
    }
}

impl<const N: usize> Default for WorkingArea<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything needed to create a thread
#[derive(Debug, Clone, Copy)]
pub struct ThreadDescriptor {
    pub name: &'static str,
    pub area: MemoryArea,
    pub prio: Prio,
    pub entry: ThreadFn,
    pub arg: *mut (),
}

impl ThreadDescriptor {
    pub fn new<const N: usize>(
        name: &'static str,
        wa: &'static WorkingArea<N>,
        prio: Prio,
        entry: ThreadFn,
        arg: *mut (),
    ) -> Self {
        ThreadDescriptor {
            name,
            area: wa.area(),
            prio,
            entry,
            arg,
        }
    }

    /// Descriptor over a raw memory area
    ///
    /// # Safety
    /// The area must stay valid and unused by anything else until the
    /// thread has been disposed.
    pub const unsafe fn from_area(
        name: &'static str,
        area: MemoryArea,
        prio: Prio,
        entry: ThreadFn,
        arg: *mut (),
    ) -> Self {
        ThreadDescriptor {
            name,
            area,
            prio,
            entry,
            arg,
        }
    }
}

// ============ Lock-held operations ============

impl<P: Port> SysLock<'_, P> {
    /// Create a thread in `WaitingStart`, returning its arena slot
    pub(crate) fn create_thread_s(&mut self, desc: &ThreadDescriptor) -> OsResult<usize> {
        let area = desc.area;
        if desc.prio == NOPRIO || desc.prio > HIGHPRIO {
            return Err(OsError::PrioInvalid);
        }
        if area.start() % P::WORKING_AREA_ALIGN != 0 || area.size % P::WORKING_AREA_ALIGN != 0 {
            return Err(OsError::WorkingAreaMisaligned);
        }
        if area.size < P::MIN_WORKING_AREA {
            return Err(OsError::WorkingAreaTooSmall);
        }

        let quantum = self.kernel().config().time_quantum;
        let sched = self.sched();
        let in_use = sched
            .registry
            .iter(&sched.threads)
            .any(|idx| sched.threads[idx].area.overlaps(&area));
        os_check!(in &*sched, !in_use, "working area in use");

        let idx = sched.alloc_slot().ok_or(OsError::NoFreeThreadSlot)?;
        self.fill_area(area);

        let kernel = self.kernel();
        let sched = self.sched();
        let thread = sched.thread_mut(idx);
        thread.object_init(desc.name, desc.prio, quantum);
        thread.area = area;
        // SAFETY: the area was validated and no live thread uses it.
        unsafe {
            kernel
                .port()
                .init_context(&mut thread.ctx, area, desc.entry, desc.arg)
        };
        sched.registry.push_back(&mut sched.threads, idx);

        crate::debug!("thread {} created at prio {}", desc.name, desc.prio);
        Ok(idx)
    }

    /// Ready a thread created suspended, I-class
    pub fn start_i(&mut self, id: ThreadId) {
        let sched = self.sched();
        let idx = sched.resolve(id);
        os_check!(
            in &*sched,
            sched.thread(idx).state == ThreadState::WaitingStart,
            "wrong state"
        );
        crate::debug!("thread {} started", sched.thread(idx).name);
        sched.ready_behind(idx);
    }

    /// Terminate the calling thread with `code`
    pub fn exit_s(&mut self, code: i32) -> ! {
        self.check_thread_class();
        let sched = self.sched();
        let me = sched.current();

        let thread = sched.thread_mut(me);
        thread.exit_code = code;
        let mut waiting = thread.waiting;
        thread.waiting = crate::core::list::ThreadList::new();

        // Every waiter collects the same code
        while let Some(w) = waiting.pop_front(&mut self.sched().threads) {
            self.ready_idx_i(w, Msg::Ok);
        }

        let sched = self.sched();
        let thread = sched.thread(me);
        crate::debug!("thread {} exit {}", thread.name, code);
        if thread.refs == 0 && thread.dispose.is_none() {
            sched.registry.remove(&mut sched.threads, me);
            sched.thread_mut(me).recycle();
        }
        self.go_to_final_s()
    }

    /// Drop a final thread from the registry and free its slot
    fn dispose_s(&mut self, idx: usize) -> Option<Dispose> {
        let sched = self.sched();
        sched.registry.remove(&mut sched.threads, idx);
        let thread = sched.thread_mut(idx);
        crate::debug!("thread {} disposed", thread.name);
        let dispose = thread.dispose.take();
        thread.recycle();
        dispose
    }

    /// Suspend the caller for `ticks`
    pub fn sleep_s(&mut self, ticks: Ticks) -> Msg {
        self.go_to_sleep_timeout_s(SleepReason::Delay, WaitTarget::None, Timeout::After(ticks))
    }

    fn release_s(&mut self, id: ThreadId) -> Option<Dispose> {
        let sched = self.sched();
        let idx = sched.resolve(id);
        os_check!(in &*sched, sched.thread(idx).refs > 0, "not referenced");

        let thread = sched.thread_mut(idx);
        thread.refs -= 1;
        if thread.refs == 0 && thread.state == ThreadState::Final {
            return self.dispose_s(idx);
        }
        None
    }

    fn info_s(&mut self, idx: usize) -> ThreadInfo {
        let sched = self.sched();
        let t = sched.thread(idx);
        ThreadInfo {
            id: sched.id_of(idx),
            name: t.name,
            prio: t.prio,
            state: t.state,
            refs: t.refs,
            runtime: t.runtime,
        }
    }
}

// ============ Thread API ============

impl<P: Port> Kernel<P> {
    /// Create a thread without starting it
    ///
    /// # Returns
    /// * `Err(OsError::PrioInvalid)` - priority outside `1..=HIGHPRIO`
    /// * `Err(OsError::WorkingAreaMisaligned)` - base or size not aligned
    /// * `Err(OsError::WorkingAreaTooSmall)` - below the port minimum
    /// * `Err(OsError::NoFreeThreadSlot)` - the arena is full
    pub fn create_suspended(&self, desc: &ThreadDescriptor) -> OsResult<ThreadId> {
        let mut lock = self.lock();
        lock.check_thread_class();
        let idx = lock.create_thread_s(desc)?;
        Ok(lock.sched().id_of(idx))
    }

    /// Start a thread created with [`create_suspended`](Self::create_suspended)
    pub fn start_thread(&self, id: ThreadId) {
        let mut lock = self.lock();
        lock.start_i(id);
        lock.reschedule_s();
    }

    /// Create and start a thread in one step
    pub fn create_running(&self, desc: &ThreadDescriptor) -> OsResult<ThreadId> {
        let mut lock = self.lock();
        lock.check_thread_class();
        let idx = lock.create_thread_s(desc)?;
        let id = lock.sched().id_of(idx);
        crate::debug!("thread {} started", desc.name);
        lock.wakeup_idx_s(idx, Msg::Ok);
        Ok(id)
    }

    /// Create and start a thread whose working area comes from `heap`
    ///
    /// The working area goes back to the heap when the thread is disposed.
    #[cfg(feature = "heap")]
    pub fn create_from_heap<L: HeapLock>(
        &self,
        heap: &'static Heap<L>,
        size: usize,
        name: &'static str,
        prio: Prio,
        entry: ThreadFn,
        arg: *mut (),
    ) -> OsResult<ThreadId> {
        let size = crate::types::checked_align_up(size, P::WORKING_AREA_ALIGN).ok_or(OsError::OutOfMemory)?;
        let align = P::WORKING_AREA_ALIGN.max(Heap::<L>::UNIT);
        let block = heap.alloc_aligned(size, align).ok_or(OsError::OutOfMemory)?;

        // SAFETY: the block is ours until it is handed back to the heap.
        let desc = unsafe { ThreadDescriptor::from_area(name, MemoryArea::new(block.as_ptr(), size), prio, entry, arg) };

        let mut lock = self.lock();
        lock.check_thread_class();
        match lock.create_thread_s(&desc) {
            Ok(idx) => {
                lock.sched().thread_mut(idx).dispose = Some(Dispose {
                    release: release_to_heap::<L>,
                    owner: heap as *const Heap<L> as *const (),
                    block,
                });
                let id = lock.sched().id_of(idx);
                lock.wakeup_idx_s(idx, Msg::Ok);
                Ok(id)
            }
            Err(err) => {
                drop(lock);
                // SAFETY: the block was never given to a thread.
                unsafe { heap.free(block) };
                Err(err)
            }
        }
    }

    /// Dispose heap threads that exited with no reference left
    ///
    /// A detached heap thread cannot free the stack it runs on, so its
    /// working area is reclaimed here. Returns the number of threads
    /// disposed.
    pub fn reap_detached(&self) -> usize {
        let mut reaped = 0;
        loop {
            let dispose = {
                let mut lock = self.lock();
                let sched = lock.sched();
                let found = sched.registry.iter(&sched.threads).find(|&idx| {
                    let t = &sched.threads[idx];
                    t.state == ThreadState::Final && t.refs == 0 && t.dispose.is_some()
                });
                match found {
                    Some(idx) => lock.dispose_s(idx),
                    None => return reaped,
                }
            };
            if let Some(d) = dispose {
                // SAFETY: the slot is recycled, nothing runs on the block.
                unsafe { d.run() };
            }
            reaped += 1;
        }
    }

    /// Terminate the calling thread
    pub fn exit(&self, code: i32) -> ! {
        self.lock().exit_s(code)
    }

    /// Wait for `id` to terminate and collect its exit code
    ///
    /// Consumes the caller's reference to the thread.
    pub fn wait_for_exit(&self, id: ThreadId) -> i32 {
        let code = {
            let mut lock = self.lock();
            let sched = lock.sched();
            let idx = sched.resolve(id);
            os_check!(in &*sched, idx != sched.current(), "waiting for self");
            os_check!(in &*sched, sched.thread(idx).refs > 0, "not referenced");

            if sched.thread(idx).state != ThreadState::Final {
                let me = sched.current();
                let mut waiting = sched.thread(idx).waiting;
                lock.enqueue_s(&mut waiting, me);
                lock.sched().thread_mut(idx).waiting = waiting;
                lock.go_to_sleep_s(SleepReason::WaitExit, WaitTarget::None);
            }
            let code = lock.sched().thread(idx).exit_code;
            code
        };

        self.release(id);
        code
    }

    /// Take an extra reference to a thread
    pub fn add_ref(&self, id: ThreadId) -> ThreadId {
        let mut lock = self.lock();
        let sched = lock.sched();
        let idx = sched.resolve(id);
        os_check!(in &*sched, sched.thread(idx).refs < u8::MAX, "too many references");
        sched.thread_mut(idx).refs += 1;
        id
    }

    /// Give back a reference
    ///
    /// The last reference to a final thread disposes it.
    pub fn release(&self, id: ThreadId) {
        let dispose = self.lock().release_s(id);
        if let Some(d) = dispose {
            // SAFETY: the slot is recycled, nothing runs on the block.
            unsafe { d.run() };
        }
    }

    /// Handle of the calling thread
    pub fn current_thread(&self) -> ThreadId {
        self.lock().sched().current_id()
    }

    /// Change the priority of the calling thread, returning the old one
    pub fn set_priority(&self, prio: Prio) -> Prio {
        os_check!(in self, prio != NOPRIO && prio <= HIGHPRIO, "invalid priority");

        let mut lock = self.lock();
        let sched = lock.sched();
        let me = sched.current();
        let old = sched.thread(me).prio;
        sched.thread_mut(me).prio = prio;
        lock.reschedule_s();
        old
    }

    /// Suspend the caller for `ticks`; zero returns at once
    pub fn sleep(&self, ticks: Ticks) {
        if ticks == 0 {
            return;
        }
        self.lock().sleep_s(ticks);
    }

    pub fn sleep_ms(&self, ms: u32) {
        self.sleep(self.config().ms_to_ticks(ms));
    }

    /// Suspend the caller until the system time reaches `time`
    pub fn sleep_until(&self, time: Systime) {
        let mut lock = self.lock();
        let interval = time_diff(lock.sched().systime(), time);
        if interval > 0 {
            lock.sleep_s(interval);
        }
    }

    /// Suspend until `next` if the current time lies in `[prev, next)`
    ///
    /// Returns `next`, to be used as `prev` of the following period.
    pub fn sleep_until_windowed(&self, prev: Systime, next: Systime) -> Systime {
        let mut lock = self.lock();
        let now = lock.sched().systime();
        if is_in_range(now, prev, next) {
            lock.sleep_s(time_diff(now, next));
        }
        next
    }

    /// Let ready threads of equal or higher priority run
    pub fn yield_now(&self) {
        let mut lock = self.lock();
        lock.check_thread_class();
        if lock.sched().can_yield() {
            let sw = lock.sched().reschedule_behind();
            lock.switch(sw);
        }
    }

    /// Ask a thread to terminate at its next check
    pub fn request_terminate(&self, id: ThreadId) {
        let mut lock = self.lock();
        let sched = lock.sched();
        let idx = sched.resolve(id);
        sched.thread_mut(idx).terminate = true;
    }

    /// `true` once the calling thread has been asked to terminate
    pub fn should_terminate(&self) -> bool {
        let mut lock = self.lock();
        let sched = lock.sched();
        sched.thread(sched.current()).terminate
    }

    // ============ Registry ============

    /// Visit a snapshot of every registered thread
    ///
    /// `f` runs outside the lock and may call into the kernel.
    pub fn for_each_thread(&self, mut f: impl FnMut(&ThreadInfo)) {
        let mut snapshot: [Option<ThreadInfo>; CFG_THREADS_MAX] = [None; CFG_THREADS_MAX];
        {
            let mut lock = self.lock();
            let sched = lock.sched();
            let mut cursor = sched.registry.head();
            let mut n = 0;
            while let Some(idx) = cursor {
                snapshot[n] = Some(lock.info_s(idx));
                n += 1;
                cursor = lock.sched().thread(idx).registry.next;
            }
        }
        snapshot.iter().flatten().for_each(|info| f(info));
    }

    /// Look a thread up by name, returning a new reference
    pub fn find_thread_by_name(&self, name: &str) -> Option<ThreadId> {
        let mut lock = self.lock();
        let sched = lock.sched();
        let idx = sched
            .registry
            .iter(&sched.threads)
            .find(|&idx| sched.threads[idx].name == name)?;

        os_check!(in &*sched, sched.thread(idx).refs < u8::MAX, "too many references");
        sched.thread_mut(idx).refs += 1;
        Some(sched.id_of(idx))
    }

    pub fn thread_info(&self, id: ThreadId) -> ThreadInfo {
        let mut lock = self.lock();
        let idx = lock.sched().resolve(id);
        lock.info_s(idx)
    }

    /// Bytes at the bottom of a working area never written by its thread
    pub fn stack_unused(&self, id: ThreadId) -> usize {
        if !self.config().fill_stacks {
            self.fail("stack filling disabled");
        }

        let mut lock = self.lock();
        let sched = lock.sched();
        let area = sched.thread(sched.resolve(id)).area;
        if area.size == 0 {
            return 0;
        }
        // SAFETY: the area belongs to a live thread and stacks grow down,
        // so the bottom bytes are only read here.
        let bytes = unsafe { core::slice::from_raw_parts(area.base, area.size) };
        bytes
            .iter()
            .position(|&b| b != CFG_STACK_FILL_VALUE)
            .unwrap_or(area.size)
    }
}

#[cfg(feature = "heap")]
unsafe fn release_to_heap<L: HeapLock>(owner: *const (), block: core::ptr::NonNull<u8>) {
    // SAFETY: `create_from_heap` stored a `&'static Heap<L>` and its block.
    unsafe {
        let heap = &*(owner as *const Heap<L>);
        heap.free(block);
    }
}
