//! Kernel assertions
//!
//! Programming errors are not reported through `Result`: the kernel halts
//! with a short tag naming the broken rule. `os_check!` guards API
//! parameters, `os_assert!` guards internal invariants.
//!
//! Every check runs in a [`CheckScope`]. Objects bound to a kernel check
//! at that kernel's configured level and mark only that kernel halted.
//! Objects without a kernel (heaps, the core allocator, a semaphore being
//! initialized) use the process-wide [`Global`] scope.

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// How much checking stays armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[repr(u8)]
pub enum CheckLevel {
    /// No checks
    Off = 0,
    /// API parameter checks
    Checks = 1,
    /// Parameter checks and internal invariants
    Asserts = 2,
}

impl CheckLevel {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => CheckLevel::Off,
            1 => CheckLevel::Checks,
            _ => CheckLevel::Asserts,
        }
    }
}

/// Where a check takes its level from and what a failure marks halted
pub trait CheckScope {
    fn check_level(&self) -> CheckLevel;

    /// Record the failure, then stop
    fn fail(&self, tag: &'static str) -> !;
}

static GLOBAL_LEVEL: AtomicU8 = AtomicU8::new(CheckLevel::Asserts as u8);
static GLOBAL_HALTED: AtomicBool = AtomicBool::new(false);
static LOG_TIME: AtomicU32 = AtomicU32::new(0);

/// Scope of the objects not bound to a kernel
pub struct Global;

impl CheckScope for Global {
    fn check_level(&self) -> CheckLevel {
        CheckLevel::from_u8(GLOBAL_LEVEL.load(Ordering::Relaxed))
    }

    fn fail(&self, tag: &'static str) -> ! {
        GLOBAL_HALTED.store(true, Ordering::Relaxed);
        halt(tag)
    }
}

/// Select the check level of the [`Global`] scope
///
/// Kernels take theirs from [`KernelConfig`](crate::config::KernelConfig).
pub fn set_check_level(level: CheckLevel) {
    GLOBAL_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns `true` once a check of the [`Global`] scope failed
#[inline]
pub fn has_halted() -> bool {
    GLOBAL_HALTED.load(Ordering::Relaxed)
}

/// Per-object halt marker for scopes that own one
pub struct HaltFlag(AtomicBool);

impl HaltFlag {
    pub const fn new() -> Self {
        HaltFlag(AtomicBool::new(false))
    }

    #[inline]
    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for HaltFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Record the system time stamped on log records
#[inline]
pub(crate) fn note_time(systime: u32) {
    LOG_TIME.store(systime, Ordering::Relaxed);
}

/// System time of the last tick
#[inline]
pub fn log_time() -> u32 {
    LOG_TIME.load(Ordering::Relaxed)
}

/// Stop the system with a diagnostic tag
#[cold]
#[inline(never)]
pub fn halt(tag: &'static str) -> ! {
    crate::error!("halt: {}", tag);
    panic!("{}", tag)
}

#[doc(hidden)]
#[inline]
pub fn armed<S: CheckScope + ?Sized>(scope: &S, level: CheckLevel) -> bool {
    scope.check_level() >= level
}

#[doc(hidden)]
#[cold]
pub fn fail<S: CheckScope + ?Sized>(scope: &S, tag: &'static str) -> ! {
    scope.fail(tag)
}

/// Parameter check; `in scope,` picks the scope, [`Global`] otherwise
macro_rules! os_check {
    (in $scope:expr, $cond:expr, $tag:expr) => {
        if $crate::core::debug::armed($scope, $crate::core::debug::CheckLevel::Checks) && !($cond) {
            $crate::core::debug::fail($scope, $tag);
        }
    };
    ($cond:expr, $tag:expr) => {
        $crate::core::debug::os_check!(in &$crate::core::debug::Global, $cond, $tag)
    };
}

/// Invariant check, same scoping as [`os_check!`]
macro_rules! os_assert {
    (in $scope:expr, $cond:expr, $tag:expr) => {
        if $crate::core::debug::armed($scope, $crate::core::debug::CheckLevel::Asserts) && !($cond) {
            $crate::core::debug::fail($scope, $tag);
        }
    };
    ($cond:expr, $tag:expr) => {
        $crate::core::debug::os_assert!(in &$crate::core::debug::Global, $cond, $tag)
    };
}

pub(crate) use os_assert;
pub(crate) use os_check;
