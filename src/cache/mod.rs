// =============================================================================
// Prediction Cache
// =============================================================================
//
// A bounded, expiring key/value store shared by every request. Time is read
// through the `Clock` trait so tests can step it by hand.

pub mod ttl_cache;

use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::types::Strategy;

pub use ttl_cache::{spawn_sweeper, CacheStats, TtlCache};

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time via `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: parking_lot::Mutex<Instant>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        *self.now.lock() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Cache key for a request: hex SHA-256 over the last `window` points and the
/// strategy name. `window` is clamped to at least one point.
pub fn fingerprint(points: &[f64], window: usize, strategy: Strategy) -> String {
    let tail = &points[points.len().saturating_sub(window.max(1))..];
    let mut hasher = Sha256::new();
    for (i, p) in tail.iter().enumerate() {
        if i > 0 {
            hasher.update(b",");
        }
        hasher.update(p.to_string().as_bytes());
    }
    hasher.update(b"|");
    hasher.update(strategy.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_depends_on_tail_and_strategy() {
        let a = [9.0, 1.0, 2.0, 3.0];
        let b = [7.0, 1.0, 2.0, 3.0];
        assert_eq!(
            fingerprint(&a, 3, Strategy::Balanced),
            fingerprint(&b, 3, Strategy::Balanced)
        );
        assert_ne!(
            fingerprint(&a, 4, Strategy::Balanced),
            fingerprint(&b, 4, Strategy::Balanced)
        );
        assert_ne!(
            fingerprint(&a, 3, Strategy::Balanced),
            fingerprint(&a, 3, Strategy::Aggressive)
        );
        assert_eq!(fingerprint(&a, 3, Strategy::Balanced).len(), 64);
    }

    #[test]
    fn zero_window_hashes_last_point() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 2.0, 4.0];
        assert_eq!(
            fingerprint(&a, 0, Strategy::Balanced),
            fingerprint(&a, 1, Strategy::Balanced)
        );
        assert_ne!(
            fingerprint(&a, 0, Strategy::Balanced),
            fingerprint(&b, 0, Strategy::Balanced)
        );
    }

    #[test]
    fn manual_clock_advances() {
        use std::time::Duration;

        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now() - t0, Duration::from_secs(2));
    }
}
