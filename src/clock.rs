//! Clock sources for timestamping and pacing.
//!
//! The engine needs two clocks in parallel:
//!
//! - a **wall clock** in the same epoch as the master (Unix epoch
//!   nanoseconds here) for the T2/T3 samples that enter the offset math;
//! - a **monotonic tick counter** with a known frequency for timeouts and
//!   pacing, immune to wall-clock jumps.
//!
//! Mixing the epochs corrupts the offset result, so both live behind one
//! trait and every consumer receives them together.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::{DELAY_REQ_INTERVAL, DELAY_RESP_TIMEOUT, SYNC_TIMEOUT};

/// Paired wall-clock / monotonic time source.
pub trait Clock: Send + Sync {
    /// Wall-clock nanoseconds since the Unix epoch.
    fn wall_ns(&self) -> u64;

    /// Monotonic tick counter. Starts at an arbitrary origin.
    fn ticks(&self) -> u64;

    /// Tick frequency in Hz.
    fn tick_hz(&self) -> u64;
}

/// Production clock: `SystemTime` for the wall arm, `Instant` for ticks.
///
/// Ticks are nanoseconds since construction, so the tick frequency is
/// 1 GHz.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_ns(&self) -> u64 {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        saturating_ns(dur)
    }

    fn ticks(&self) -> u64 {
        saturating_ns(self.origin.elapsed())
    }

    fn tick_hz(&self) -> u64 {
        1_000_000_000
    }
}

// u64 nanoseconds overflow ~584 years after the origin; saturate there.
fn saturating_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Protocol timeouts converted into ticks of a concrete clock.
///
/// Captured once at engine init so the hot loop compares plain integers.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Sync staleness window.
    pub sync_timeout: u64,
    /// `Delay_Resp` wait window.
    pub delay_resp_timeout: u64,
    /// Sync-to-`Delay_Req` spread.
    pub delay_req_interval: u64,
    /// Tick frequency the windows were derived from.
    pub tick_hz: u64,
}

impl Timeouts {
    /// Derive the protocol windows for a clock running at `tick_hz`.
    #[must_use]
    pub fn from_hz(tick_hz: u64) -> Self {
        Self {
            sync_timeout: duration_to_ticks(SYNC_TIMEOUT, tick_hz),
            delay_resp_timeout: duration_to_ticks(DELAY_RESP_TIMEOUT, tick_hz),
            delay_req_interval: duration_to_ticks(DELAY_REQ_INTERVAL, tick_hz),
            tick_hz,
        }
    }
}

/// Convert a duration to ticks at the given frequency.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    reason = "tick counts for protocol-scale durations fit u64 at any real frequency"
)]
pub fn duration_to_ticks(d: Duration, tick_hz: u64) -> u64 {
    (d.as_nanos() * u128::from(tick_hz) / 1_000_000_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_wall_is_recent() {
        let clock = SystemClock::new();
        // After 2020-01-01 in nanoseconds.
        assert!(clock.wall_ns() > 1_577_836_800 * 1_000_000_000);
    }

    #[test]
    fn test_system_clock_ticks_monotonic() {
        let clock = SystemClock::new();
        let a = clock.ticks();
        let b = clock.ticks();
        assert!(b >= a);
    }

    #[test]
    fn test_timeouts_at_nanosecond_hz() {
        let t = Timeouts::from_hz(1_000_000_000);
        assert_eq!(t.sync_timeout, 3_000_000_000);
        assert_eq!(t.delay_resp_timeout, 2_000_000_000);
        assert_eq!(t.delay_req_interval, 100_000_000);
    }

    #[test]
    fn test_timeouts_scale_with_hz() {
        let t = Timeouts::from_hz(2_400_000_000);
        assert_eq!(t.sync_timeout, 7_200_000_000);
        assert_eq!(t.delay_req_interval, 240_000_000);
    }

    #[test]
    fn test_duration_to_ticks_low_frequency() {
        assert_eq!(duration_to_ticks(Duration::from_secs(1), 1000), 1000);
        assert_eq!(duration_to_ticks(Duration::from_millis(100), 1000), 100);
    }
}
