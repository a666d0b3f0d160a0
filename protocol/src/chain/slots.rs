//! Slot-quantized logical time.
//!
//! Transaction timestamps are seconds since the network epoch
//! ([`EngineConfig::epoch_time`](crate::config::EngineConfig)). A slot is
//! `slot_interval_secs` wide; a transaction whose slot lies after the
//! current slot is from the future and gets rejected.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;

/// Source of logical time.
pub trait SlotClock: Send + Sync {
    /// Current logical timestamp.
    fn get_time(&self) -> u32;

    /// Length of one slot in seconds.
    fn interval(&self) -> u64;

    /// Slot containing `timestamp`, or the current slot when `None`.
    fn get_slot_number(&self, timestamp: Option<u32>) -> u64 {
        let ts = timestamp.unwrap_or_else(|| self.get_time());
        u64::from(ts) / self.interval().max(1)
    }
}

/// Wall-clock backed slot clock.
#[derive(Debug, Clone)]
pub struct SystemSlotClock {
    epoch: DateTime<Utc>,
    interval: u64,
}

impl SystemSlotClock {
    pub fn new(epoch: DateTime<Utc>, interval: u64) -> Self {
        Self { epoch, interval }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.epoch_time, config.slot_interval_secs)
    }

    /// Logical timestamp of an arbitrary instant. Instants before the
    /// epoch map to zero.
    pub fn time_at(&self, instant: DateTime<Utc>) -> u32 {
        let secs = (instant - self.epoch).num_seconds();
        u32::try_from(secs.max(0)).unwrap_or(u32::MAX)
    }
}

impl SlotClock for SystemSlotClock {
    fn get_time(&self) -> u32 {
        self.time_at(Utc::now())
    }

    fn interval(&self) -> u64 {
        self.interval
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug)]
pub struct FixedSlotClock {
    now: AtomicU32,
    interval: u64,
}

impl FixedSlotClock {
    pub fn new(now: u32, interval: u64) -> Self {
        Self {
            now: AtomicU32::new(now),
            interval,
        }
    }

    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl SlotClock for FixedSlotClock {
    fn get_time(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }

    fn interval(&self) -> u64 {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn slot_number_quantizes() {
        let clock = FixedSlotClock::new(105, 10);
        assert_eq!(clock.get_slot_number(None), 10);
        assert_eq!(clock.get_slot_number(Some(99)), 9);
        assert_eq!(clock.get_slot_number(Some(109)), 10);
        clock.set(200);
        assert_eq!(clock.get_slot_number(None), 20);
    }

    #[test]
    fn system_clock_counts_from_epoch() {
        let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = SystemSlotClock::new(epoch, 10);
        assert_eq!(clock.time_at(epoch + Duration::seconds(42)), 42);
        assert_eq!(clock.time_at(epoch - Duration::seconds(5)), 0);
        assert!(clock.get_time() > 0);
    }

    #[test]
    fn zero_interval_does_not_divide_by_zero() {
        let clock = FixedSlotClock::new(7, 0);
        assert_eq!(clock.get_slot_number(None), 7);
    }
}
