//! Error types
//!
//! Recoverable failures of the kernel API. Wakeup outcomes travel as
//! [`Msg`](crate::types::Msg) and programming errors halt, so this set
//! stays small.

/// RTOS error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    // ============ Priority errors ============
    /// Priority outside `IDLEPRIO..=HIGHPRIO`
    PrioInvalid = 25203,

    // ============ Working area errors ============
    /// Working area smaller than the port minimum
    WorkingAreaTooSmall = 28208,
    /// Working area base or size not aligned as the port requires
    WorkingAreaMisaligned = 28209,

    // ============ Thread errors ============
    /// The thread arena is full
    NoFreeThreadSlot = 29008,

    // ============ Memory errors ============
    /// Neither the heap nor its provider could satisfy the request
    OutOfMemory = 22210,

    // ============ Time errors ============
    /// Time value out of range
    TimeInvalid = 29310,
}

/// Result type alias for RTOS operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Numeric error code
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }
}
