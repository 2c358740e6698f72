//! Kernel configuration
//!
//! Compile-time constants size the kernel's static tables. Everything
//! that only parameterizes behavior lives in [`KernelConfig`], built once
//! and handed to [`Kernel::new`](crate::kernel::Kernel::new).

use crate::core::debug::CheckLevel;
use crate::error::{OsError, OsResult};
use crate::types::Ticks;

/// Number of priority levels, including `NOPRIO`
pub const CFG_PRIO_LEVELS: usize = 64;

/// Size of the thread arena (main and idle included)
pub const CFG_THREADS_MAX: usize = 16;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Default round-robin quantum in ticks
pub const CFG_TIME_QUANTUM: u32 = 10;

/// Working area of the idle thread in bytes
pub const CFG_IDLE_STACK_SIZE: usize = 512;

/// Pattern written into working areas when stack filling is enabled
pub const CFG_STACK_FILL_VALUE: u8 = 0x55;

/// Ordering of threads inside every wait list of a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
pub enum QueuePolicy {
    /// Insertion order
    Fifo,
    /// Highest priority first, insertion order among equals
    Priority,
}

/// Runtime kernel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Frequency of the system tick
    pub tick_rate_hz: u32,
    /// Round-robin quantum in ticks, 0 disables time slicing
    pub time_quantum: u32,
    /// Wait list ordering shared by every primitive
    pub queue_policy: QueuePolicy,
    /// Which assertions stay armed
    pub check_level: CheckLevel,
    /// Check the outgoing stack pointer on every context switch
    pub stack_check: bool,
    /// Fill new working areas with [`CFG_STACK_FILL_VALUE`]
    pub fill_stacks: bool,
}

impl KernelConfig {
    pub const DEFAULT: Self = Self {
        tick_rate_hz: CFG_TICK_RATE_HZ,
        time_quantum: CFG_TIME_QUANTUM,
        queue_policy: QueuePolicy::Priority,
        check_level: CheckLevel::Asserts,
        stack_check: true,
        fill_stacks: true,
    };

    pub const fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    pub const fn with_time_quantum(mut self, ticks: u32) -> Self {
        self.time_quantum = ticks;
        self
    }

    pub const fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }

    pub const fn with_check_level(mut self, level: CheckLevel) -> Self {
        self.check_level = level;
        self
    }

    pub const fn with_stack_check(mut self, enabled: bool) -> Self {
        self.stack_check = enabled;
        self
    }

    pub const fn with_fill_stacks(mut self, enabled: bool) -> Self {
        self.fill_stacks = enabled;
        self
    }

    /// Round-robin is active
    #[inline]
    pub const fn round_robin(&self) -> bool {
        self.time_quantum > 0
    }

    // ============ Time conversions ============

    /// Milliseconds to ticks, rounding up
    pub const fn ms_to_ticks(&self, ms: u32) -> Ticks {
        Self::div_ceil(ms as u64 * self.tick_rate_hz as u64, 1_000)
    }

    /// Seconds to ticks
    pub const fn s_to_ticks(&self, s: u32) -> Ticks {
        Self::div_ceil(s as u64 * self.tick_rate_hz as u64, 1)
    }

    /// Microseconds to ticks, rounding up
    pub const fn us_to_ticks(&self, us: u32) -> Ticks {
        Self::div_ceil(us as u64 * self.tick_rate_hz as u64, 1_000_000)
    }

    /// Ticks to milliseconds, rounding up
    pub const fn ticks_to_ms(&self, ticks: Ticks) -> u32 {
        Self::div_ceil(ticks as u64 * 1_000, self.tick_rate_hz as u64)
    }

    /// Hours, minutes, seconds and milliseconds to ticks
    ///
    /// # Returns
    /// * `Err(OsError::TimeInvalid)` - a field is out of range or the
    ///   result does not fit in [`Ticks`]
    pub fn hmsm_to_ticks(&self, hours: u16, minutes: u8, seconds: u8, millis: u16) -> OsResult<Ticks> {
        if minutes > 59 || seconds > 59 || millis > 999 {
            return Err(OsError::TimeInvalid);
        }

        let total_ms = hours as u64 * 3_600_000
            + minutes as u64 * 60_000
            + seconds as u64 * 1_000
            + millis as u64;

        let ticks = (total_ms * self.tick_rate_hz as u64).div_ceil(1_000);
        Ticks::try_from(ticks).map_err(|_| OsError::TimeInvalid)
    }

    const fn div_ceil(n: u64, d: u64) -> u32 {
        let q = (n + d - 1) / d;
        if q > u32::MAX as u64 {
            u32::MAX
        } else {
            q as u32
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
