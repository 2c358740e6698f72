//! Language items and default exception handlers

// With defmt, RTT carries the logs and panic-probe reports panics
#[cfg(all(feature = "defmt", target_arch = "arm", target_os = "none"))]
use defmt_rtt as _;

#[cfg(all(feature = "defmt", target_arch = "arm", target_os = "none"))]
use panic_probe as _;

#[cfg(all(feature = "defmt", target_arch = "arm", target_os = "none"))]
#[defmt::panic_handler]
fn defmt_panic() -> ! {
    cortex_m::asm::udf()
}

#[cfg(all(not(feature = "defmt"), target_arch = "arm", target_os = "none"))]
use panic_halt as _;

#[cfg(all(target_arch = "arm", target_os = "none"))]
#[cortex_m_rt::exception]
unsafe fn HardFault(ef: &cortex_m_rt::ExceptionFrame) -> ! {
    crate::error!("hard fault, pc {=u32:#x}", ef.pc());
    let _ = ef;
    loop {
        cortex_m::asm::udf();
    }
}

// Log records carry the system time of the last tick
#[cfg(all(feature = "defmt", target_arch = "arm", target_os = "none"))]
defmt::timestamp!("{=u32}", crate::core::debug::log_time());
