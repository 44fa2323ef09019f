//! Periodic `org.freedesktop.DBus.Peer.Ping` health probing (§4.7, §8
//! scenario 2).

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::{trace, warn};

/// Health-check lifecycle events fired to connection listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    Success,
    Failure,
}

/// Bound on outstanding probes in flight at once.
pub const MAX_OUTSTANDING_PROBES: u32 = 100;
/// Consecutive failures before the connection is declared FAILED.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Debug)]
pub struct HealthProbe {
    pub interval: Duration,
    outstanding: AtomicU32,
    consecutive_failures: AtomicU32,
}

impl HealthProbe {
    pub fn new(interval: Duration) -> Self {
        HealthProbe { interval, outstanding: AtomicU32::new(0), consecutive_failures: AtomicU32::new(0) }
    }

    /// Whether another probe may be sent right now (the ≤100 outstanding
    /// bound, §4.7).
    pub fn can_send_probe(&self) -> bool {
        self.outstanding.load(Ordering::Relaxed) < MAX_OUTSTANDING_PROBES
    }

    pub fn probe_sent(&self) {
        self.outstanding.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a probe's outcome. Returns `Some(HealthEvent)` to fire to
    /// listeners, and whether the ≤10-consecutive-failure bound was just
    /// exceeded (meaning the connection should transition to FAILED and
    /// stop probing).
    pub fn record_outcome(&self, succeeded: bool) -> (HealthEvent, bool) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        if succeeded {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            trace!("health probe succeeded");
            (HealthEvent::Success, false)
        } else {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(failures, "health probe failed");
            (HealthEvent::Failure, failures >= MAX_CONSECUTIVE_FAILURES)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outstanding_bound_enforced() {
        let probe = HealthProbe::new(Duration::from_millis(100));
        for _ in 0..MAX_OUTSTANDING_PROBES {
            assert!(probe.can_send_probe());
            probe.probe_sent();
        }
        assert!(!probe.can_send_probe());
    }

    #[test]
    fn ten_consecutive_failures_trip_the_breaker() {
        let probe = HealthProbe::new(Duration::from_millis(100));
        let mut tripped = false;
        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            probe.probe_sent();
            let (event, should_fail) = probe.record_outcome(false);
            assert_eq!(event, HealthEvent::Failure);
            tripped = should_fail;
        }
        assert!(tripped);
    }

    #[test]
    fn success_resets_the_streak() {
        let probe = HealthProbe::new(Duration::from_millis(100));
        probe.probe_sent();
        probe.record_outcome(false);
        probe.probe_sent();
        let (event, should_fail) = probe.record_outcome(true);
        assert_eq!(event, HealthEvent::Success);
        assert!(!should_fail);
    }
}
