//! Kernel logging
//!
//! Every level goes through [`__klog!`], which forwards to `defmt` on
//! bare-metal targets built with the `defmt` feature and expands to
//! nothing everywhere else, so the host test build carries no transport.

#[doc(hidden)]
#[cfg(all(feature = "defmt", target_os = "none"))]
#[macro_export]
macro_rules! __klog {
    (trace, $($arg:tt)*) => { defmt::trace!($($arg)*) };
    (debug, $($arg:tt)*) => { defmt::debug!($($arg)*) };
    (info, $($arg:tt)*) => { defmt::info!($($arg)*) };
    (warn, $($arg:tt)*) => { defmt::warn!($($arg)*) };
    (error, $($arg:tt)*) => { defmt::error!($($arg)*) };
}

#[doc(hidden)]
#[cfg(not(all(feature = "defmt", target_os = "none")))]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {};
}

/// Scheduler-level chatter: switches, wakeups
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::__klog!(trace, $($arg)*) };
}

/// Object lifecycle: thread creation, disposal
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::__klog!(debug, $($arg)*) };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__klog!(info, $($arg)*) };
}

/// Recoverable conditions the caller is told about through a return value
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__klog!(warn, $($arg)*) };
}

/// Fatal check failures, logged right before the halt
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__klog!(error, $($arg)*) };
}
