//! Circuit breaker over the raw LLM client: N consecutive failures trips it open;
//! after a cooldown it allows one half-open probe before fully closing or re-opening.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Lock-free breaker state, mirroring the atomic-bitmask/mode pattern used to guard
/// shared dispatcher state elsewhere in this codebase.
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    opened_at_millis: AtomicU64,
    threshold: u32,
    cooldown: Duration,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicU32::new(0),
            opened_at_millis: AtomicU64::new(0),
            threshold,
            cooldown,
            epoch: Instant::now(),
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Called before issuing a call. `Open` still within the cooldown window rejects
    /// the caller outright; `Open` past the cooldown flips to `HalfOpen` and allows
    /// exactly the caller that observes the transition through as the probe.
    pub fn allow(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => true,
            STATE_HALF_OPEN => false,
            _ => {
                let opened_at = self.opened_at_millis.load(Ordering::Acquire);
                if self.now_millis().saturating_sub(opened_at) >= self.cooldown.as_millis() as u64 {
                    self.state
                        .compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                } else {
                    false
                }
            }
        }
    }

    pub fn on_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.state.store(STATE_CLOSED, Ordering::Release);
    }

    pub fn on_failure(&self) {
        match self.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => self.trip(),
            _ => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.threshold {
                    self.trip();
                }
            }
        }
    }

    fn trip(&self) {
        self.opened_at_millis.store(self.now_millis(), Ordering::Release);
        self.state.store(STATE_OPEN, Ordering::Release);
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => CircuitState::Closed,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_threshold_consecutive_failures() {
        let b = CircuitBreaker::new(3, Duration::from_secs(30));
        assert!(b.allow());
        b.on_failure();
        b.on_failure();
        assert_eq!(b.state(), CircuitState::Closed);
        b.on_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow());
    }

    #[test]
    fn success_resets_failure_count_and_closes() {
        let b = CircuitBreaker::new(3, Duration::from_secs(30));
        b.on_failure();
        b.on_failure();
        b.on_success();
        assert_eq!(b.state(), CircuitState::Closed);
        b.on_failure();
        b.on_failure();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let b = CircuitBreaker::new(1, Duration::from_millis(0));
        b.on_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.allow());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.on_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_probe_success_closes() {
        let b = CircuitBreaker::new(1, Duration::from_millis(0));
        b.on_failure();
        assert!(b.allow());
        b.on_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }
}
