//! Timestamped values on a process-wide monotonic clock
//!
//! **App Start Relative Time Pattern**:
//! - Uses monotonic time anchored to the first clock access
//! - Unaffected by system clock changes (NTP, manual adjustments)
//! - Microsecond resolution, stored as `u64`
//! - Strictly increasing across all callers: two stamps are never equal

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global anchor point for monotonic time
static APP_START: OnceLock<Instant> = OnceLock::new();

/// Last stamp handed out
static LAST_STAMP_US: AtomicU64 = AtomicU64::new(0);

/// Monotonic time as microseconds since the clock was first used
///
/// Never returns 0, so a cursor of 0 always means "before every sample".
/// Calls landing in the same microsecond get `last + 1`, so frames read
/// back-to-back still have distinct stamps and a strictly-after cursor
/// sees every one of them. Under a sustained burst the stamps may run a
/// few microseconds ahead of the wall clock.
pub fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    let now = start.elapsed().as_micros() as u64 + 1;

    let mut last = LAST_STAMP_US.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP_US.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// A value paired with the time it was observed or produced
///
/// Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamped<T> {
    timestamp_us: u64,
    value: T,
}

impl<T> Timestamped<T> {
    pub fn new(value: T, timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            value,
        }
    }

    /// Stamp `value` with the current monotonic time
    pub fn now(value: T) -> Self {
        Self::new(value, monotonic_micros())
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_monotonic_micros_never_decreases() {
        let mut last = monotonic_micros();
        assert!(last > 0);
        for _ in 0..50 {
            thread::sleep(Duration::from_micros(100));
            let current = monotonic_micros();
            assert!(current > last, "current={}, last={}", current, last);
            last = current;
        }
    }

    #[test]
    fn test_monotonic_micros_strictly_increasing_without_sleep() {
        let stamps: Vec<u64> = (0..10_000).map(|_| monotonic_micros()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_monotonic_micros_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| thread::spawn(|| (0..5_000).map(|_| monotonic_micros()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_timestamped_accessors() {
        let stamped = Timestamped::new(-42i16, 1_000);
        assert_eq!(stamped.timestamp_us(), 1_000);
        assert_eq!(*stamped.value(), -42);
        assert_eq!(stamped.into_value(), -42);
    }

    #[test]
    fn test_timestamped_now_uses_monotonic_clock() {
        let before = monotonic_micros();
        let stamped = Timestamped::now(1u8);
        let after = monotonic_micros();
        assert!(stamped.timestamp_us() >= before && stamped.timestamp_us() <= after);
    }
}
