//! Content-keyed throttling for alert delivery.
//!
//! Alerts about the same condition tend to arrive in bursts. The throttle
//! fingerprints each message body with SHA-256 and remembers when that exact
//! body was last delivered; a repeat inside the minimum interval is refused
//! with the remaining wait, while distinct bodies pass independently.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::AlertError;

/// The floor for the minimum interval between identical alerts (10 seconds).
pub const MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Content-keyed rate limiter shared by the alert senders.
///
/// Check-then-record is deliberately split: [`Throttle::check`] admits a
/// send and returns the body's fingerprint, and only after delivery succeeds
/// does the sender call [`Throttle::record`]. A failed delivery therefore
/// does not consume the interval.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_sent: DashMap<String, Instant>,
}

impl Throttle {
    /// Creates a throttle with the given minimum interval between identical
    /// message bodies.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::IntervalTooShort`] if `min_interval` is below
    /// [`MIN_INTERVAL`].
    pub fn new(min_interval: Duration) -> Result<Self, AlertError> {
        if min_interval < MIN_INTERVAL {
            return Err(AlertError::IntervalTooShort {
                requested: min_interval,
                minimum: MIN_INTERVAL,
            });
        }
        Ok(Self {
            min_interval,
            last_sent: DashMap::new(),
        })
    }

    /// Returns the configured minimum interval.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Admits or refuses a send of `body`.
    ///
    /// On admission returns the body's fingerprint, to be handed back to
    /// [`Throttle::record`] once delivery succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::Throttled`] with the remaining wait when the
    /// same body was delivered inside the minimum interval.
    pub fn check(&self, body: &str) -> Result<String, AlertError> {
        let fingerprint = fingerprint(body);

        if let Some(entry) = self.last_sent.get(&fingerprint) {
            let elapsed = entry.value().elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(fingerprint, wait_ms = wait.as_millis(), "alert throttled");
                return Err(AlertError::Throttled { wait });
            }
        }

        Ok(fingerprint)
    }

    /// Records a successful delivery of the body behind `fingerprint`.
    pub fn record(&self, fingerprint: String) {
        self.last_sent.insert(fingerprint, Instant::now());
    }
}

/// SHA-256 fingerprint of a message body, hex-encoded.
fn fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_below_floor_rejected() {
        let result = Throttle::new(Duration::from_secs(5));
        assert!(matches!(result, Err(AlertError::IntervalTooShort { .. })));
    }

    #[test]
    fn test_interval_at_floor_accepted() {
        assert!(Throttle::new(MIN_INTERVAL).is_ok());
    }

    #[test]
    fn test_first_send_admitted() {
        let throttle = Throttle::new(MIN_INTERVAL).unwrap();
        assert!(throttle.check("disk almost full").is_ok());
    }

    #[test]
    fn test_repeat_inside_interval_throttled() {
        let throttle = Throttle::new(MIN_INTERVAL).unwrap();
        let fingerprint = throttle.check("disk almost full").unwrap();
        throttle.record(fingerprint);

        match throttle.check("disk almost full") {
            Err(AlertError::Throttled { wait }) => {
                assert!(wait <= MIN_INTERVAL);
                assert!(wait > Duration::ZERO);
            }
            other => panic!("expected Throttled, got {other:?}"),
        }
    }

    #[test]
    fn test_distinct_bodies_are_independent() {
        let throttle = Throttle::new(MIN_INTERVAL).unwrap();
        let fingerprint = throttle.check("disk almost full").unwrap();
        throttle.record(fingerprint);

        assert!(throttle.check("certificate expiring").is_ok());
    }

    #[test]
    fn test_unrecorded_check_does_not_start_interval() {
        // A refused or failed delivery must not consume the interval.
        let throttle = Throttle::new(MIN_INTERVAL).unwrap();
        let _ = throttle.check("flapping").unwrap();
        assert!(throttle.check("flapping").is_ok());
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let fp = fingerprint("abc");
        assert_eq!(fp.len(), 64);
        // Known SHA-256 of "abc".
        assert_eq!(
            fp,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
