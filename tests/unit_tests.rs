//! Unit tests for core RTOS modules
//!
//! These tests run on the host (not embedded target) to verify
//! the core algorithms work correctly.

#[cfg(test)]
mod prio_tests {
    use chrt::config::CFG_PRIO_LEVELS;
    use chrt::prio::PrioTable;
    use chrt::types::{HIGHPRIO, IDLEPRIO, NOPRIO};

    #[test]
    fn test_empty_table() {
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.get_highest(), NOPRIO);
    }

    #[test]
    fn test_multiple_priorities() {
        let mut table = PrioTable::new();

        // Insert in random order
        table.insert(20);
        table.insert(5);
        table.insert(40);
        table.insert(1);
        table.insert(33);

        // Highest (largest number) first
        assert_eq!(table.get_highest(), 40);

        table.remove(40);
        assert_eq!(table.get_highest(), 33);

        table.remove(33);
        assert_eq!(table.get_highest(), 20);

        table.remove(20);
        assert_eq!(table.get_highest(), 5);

        table.remove(5);
        assert_eq!(table.get_highest(), 1);

        table.remove(1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_word_boundaries() {
        let mut table = PrioTable::new();

        table.insert(31);
        table.insert(32);
        assert_eq!(table.get_highest(), 32);

        table.remove(32);
        assert_eq!(table.get_highest(), 31);

        table.insert(HIGHPRIO);
        assert_eq!(table.get_highest(), HIGHPRIO);
    }

    #[test]
    fn test_all_priorities() {
        let mut table = PrioTable::new();

        for p in IDLEPRIO..=HIGHPRIO {
            table.insert(p);
        }
        assert_eq!(table.get_highest(), HIGHPRIO);

        // Remove from highest to lowest
        for p in (IDLEPRIO..=HIGHPRIO).rev() {
            assert_eq!(table.get_highest(), p);
            table.remove(p);
        }
        assert!(table.is_empty());
        assert_eq!(HIGHPRIO as usize, CFG_PRIO_LEVELS - 1);
    }

    #[test]
    fn test_duplicate_insert_remove() {
        let mut table = PrioTable::new();

        // The bitmap does not count threads per level
        table.insert(10);
        table.insert(10);
        assert_eq!(table.get_highest(), 10);

        table.remove(10);
        assert!(!table.is_set(10));
        assert!(table.is_empty());
    }
}

#[cfg(test)]
mod error_tests {
    use chrt::error::OsError;

    #[test]
    fn test_error_codes_are_distinct() {
        let all = [
            OsError::PrioInvalid,
            OsError::WorkingAreaTooSmall,
            OsError::WorkingAreaMisaligned,
            OsError::NoFreeThreadSlot,
            OsError::OutOfMemory,
            OsError::TimeInvalid,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_error_debug() {
        // Ensure errors can be formatted for debugging
        let err = OsError::NoFreeThreadSlot;
        assert_eq!(format!("{:?}", err), "NoFreeThreadSlot");
    }
}

#[cfg(test)]
mod types_tests {
    use chrt::types::*;

    #[test]
    fn test_priority_ladder() {
        assert_eq!(NOPRIO, 0);
        assert!(IDLEPRIO < LOWPRIO);
        assert!(LOWPRIO < NORMALPRIO);
        assert!(NORMALPRIO < HIGHPRIO);
    }

    #[test]
    fn test_msg_codes() {
        assert_eq!(i32::from(Msg::Ok), 0);
        assert_eq!(i32::from(Msg::Timeout), -1);
        assert_eq!(i32::from(Msg::Reset), -2);
        assert_eq!(i32::from(Msg::Value(-7)), -7);
    }

    #[test]
    fn test_timeout_constructor() {
        assert_eq!(Timeout::ticks(0), Timeout::Immediate);
        assert_eq!(Timeout::ticks(1), Timeout::After(1));
    }

    #[test]
    fn test_thread_state_enum() {
        let state = ThreadState::Sleeping(SleepReason::Semaphore);
        assert_eq!(state, ThreadState::Sleeping(SleepReason::Semaphore));
        assert_ne!(state, ThreadState::Sleeping(SleepReason::Delay));
        assert_ne!(state, ThreadState::Ready);
    }

    #[test]
    fn test_alignment_helpers() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(16, 8), 16);
        assert_eq!(align_down(15, 8), 8);
    }

    #[test]
    fn test_memory_area() {
        let a = MemoryArea::new(0x2000 as *mut u8, 0x400);
        assert_eq!(a.end(), 0x2400);
        assert!(a.contains(0x23f0, 0x10));
        assert!(!a.contains(0x23f0, 0x20));
        assert!(!a.overlaps(&MemoryArea::new(0x2400 as *mut u8, 0x10)));
        assert!(!a.overlaps(&MemoryArea::empty()));
    }
}

#[cfg(test)]
mod time_tests {
    use chrt::time::{is_in_range, time_diff};

    #[test]
    fn test_time_diff_wraps() {
        assert_eq!(time_diff(10, 15), 5);
        assert_eq!(time_diff(u32::MAX - 1, 3), 5);
    }

    #[test]
    fn test_window_across_wrap() {
        let start = u32::MAX - 2;
        let end = start.wrapping_add(5);
        assert!(is_in_range(start, start, end));
        assert!(is_in_range(0, start, end));
        assert!(!is_in_range(end, start, end));
        assert!(!is_in_range(start - 1, start, end));
    }
}

#[cfg(test)]
mod config_tests {
    use chrt::config::*;
    use chrt::debug::CheckLevel;

    #[test]
    fn test_config_values() {
        assert!(CFG_PRIO_LEVELS >= 8, "Need at least 8 priority levels");
        assert!(CFG_PRIO_LEVELS <= 256, "Too many priority levels");

        assert!(CFG_THREADS_MAX >= 2, "Main and idle need a slot each");

        assert!(CFG_TICK_RATE_HZ >= 10, "Tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10000, "Tick rate too fast");
    }

    #[test]
    fn test_default_config() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg, KernelConfig::DEFAULT);
        assert_eq!(cfg.queue_policy, QueuePolicy::Priority);
        assert_eq!(cfg.check_level, CheckLevel::Asserts);
        assert!(cfg.round_robin());
    }

    #[test]
    fn test_tick_conversions() {
        let cfg = KernelConfig::DEFAULT.with_tick_rate(250);
        assert_eq!(cfg.ms_to_ticks(4), 1);
        assert_eq!(cfg.ms_to_ticks(5), 2);
        assert_eq!(cfg.s_to_ticks(2), 500);
        assert_eq!(cfg.us_to_ticks(1), 1);
        assert_eq!(cfg.ticks_to_ms(1), 4);
        assert_eq!(cfg.hmsm_to_ticks(1, 0, 0, 0), Ok(900_000));
    }

    #[test]
    fn test_check_levels_are_ordered() {
        assert!(CheckLevel::Off < CheckLevel::Checks);
        assert!(CheckLevel::Checks < CheckLevel::Asserts);
    }
}
