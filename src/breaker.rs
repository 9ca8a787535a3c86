//! Per-endpoint closed/open/half-open circuit breaker state machine.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Recognized breaker configuration options (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout: Duration,
    pub max_half_open_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            max_half_open_requests: 1,
        }
    }
}

/// Tagged circuit state (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of a single breaker.
#[derive(Debug, Clone, Copy)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub half_open_in_flight: u32,
    pub total_successes: u64,
    pub total_failures: u64,
}

#[derive(Debug)]
struct State {
    circuit: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Instant,
    half_open_in_flight: u32,
    total_successes: u64,
    total_failures: u64,
}

impl State {
    fn new() -> Self {
        Self {
            circuit: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: Instant::now(),
            half_open_in_flight: 0,
            total_successes: 0,
            total_failures: 0,
        }
    }
}

/// Whether `Allow` admitted the call, and if so under which state — the
/// pipeline needs this to know whether a half-open in-flight slot must be
/// released on every exit path (including cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { half_open: bool },
    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    CircuitOpen,
    TooManyHalfOpen,
}

/// A single endpoint's breaker. One lock guards all of its own fields; the
/// owning registry's map lock is never held while this lock is taken.
pub struct Breaker {
    config: BreakerConfig,
    state: Mutex<State>,
}

impl Breaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::new()),
        }
    }

    pub fn allow(&self) -> Admission {
        let mut s = self.state.lock().unwrap();
        match s.circuit {
            CircuitState::Closed => Admission::Admitted { half_open: false },
            CircuitState::Open => {
                if s.opened_at.elapsed() >= self.config.open_timeout {
                    s.circuit = CircuitState::HalfOpen;
                    s.half_open_in_flight = 1;
                    s.consecutive_successes = 0;
                    s.consecutive_failures = 0;
                    tracing::info!("breaker transitioning Open -> HalfOpen");
                    Admission::Admitted { half_open: true }
                } else {
                    Admission::Rejected(Rejection::CircuitOpen)
                }
            }
            CircuitState::HalfOpen => {
                if s.half_open_in_flight < self.config.max_half_open_requests {
                    s.half_open_in_flight += 1;
                    Admission::Admitted { half_open: true }
                } else {
                    Admission::Rejected(Rejection::TooManyHalfOpen)
                }
            }
        }
    }

    pub fn record_success(&self, admitted_half_open: bool) {
        let mut s = self.state.lock().unwrap();
        s.total_successes += 1;
        match s.circuit {
            CircuitState::HalfOpen => {
                if admitted_half_open {
                    s.half_open_in_flight = s.half_open_in_flight.saturating_sub(1);
                }
                s.consecutive_successes += 1;
                if s.consecutive_successes >= self.config.success_threshold {
                    tracing::info!("breaker transitioning HalfOpen -> Closed");
                    s.circuit = CircuitState::Closed;
                    s.consecutive_failures = 0;
                    s.consecutive_successes = 0;
                    s.half_open_in_flight = 0;
                }
            }
            CircuitState::Closed => {
                s.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, admitted_half_open: bool) {
        let mut s = self.state.lock().unwrap();
        s.total_failures += 1;
        match s.circuit {
            CircuitState::Closed => {
                s.consecutive_failures += 1;
                if s.consecutive_failures >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = s.consecutive_failures,
                        "breaker transitioning Closed -> Open"
                    );
                    s.circuit = CircuitState::Open;
                    s.opened_at = Instant::now();
                    s.consecutive_failures = 0;
                }
            }
            CircuitState::HalfOpen => {
                if admitted_half_open {
                    s.half_open_in_flight = s.half_open_in_flight.saturating_sub(1);
                }
                tracing::warn!("breaker transitioning HalfOpen -> Open");
                s.circuit = CircuitState::Open;
                s.opened_at = Instant::now();
                s.consecutive_failures = 0;
                s.consecutive_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Releases a half-open in-flight slot without recording an outcome,
    /// used when a call admitted under HalfOpen is cancelled.
    pub fn release_half_open_slot(&self) {
        let mut s = self.state.lock().unwrap();
        if s.circuit == CircuitState::HalfOpen {
            s.half_open_in_flight = s.half_open_in_flight.saturating_sub(1);
        }
    }

    pub fn stats(&self) -> BreakerStats {
        let s = self.state.lock().unwrap();
        BreakerStats {
            state: s.circuit,
            consecutive_failures: s.consecutive_failures,
            consecutive_successes: s.consecutive_successes,
            half_open_in_flight: s.half_open_in_flight,
            total_successes: s.total_successes,
            total_failures: s.total_failures,
        }
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap() = State::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32) -> Breaker {
        Breaker::new(BreakerConfig {
            failure_threshold,
            success_threshold: 2,
            open_timeout: Duration::from_millis(50),
            max_half_open_requests: 1,
        })
    }

    #[test]
    fn trips_after_exactly_f_consecutive_failures() {
        let b = breaker(3);
        for _ in 0..2 {
            assert!(matches!(b.allow(), Admission::Admitted { .. }));
            b.record_failure(false);
        }
        assert_eq!(b.stats().state, CircuitState::Closed);
        assert!(matches!(b.allow(), Admission::Admitted { .. }));
        b.record_failure(false);
        assert_eq!(b.stats().state, CircuitState::Open);
    }

    #[test]
    fn success_resets_consecutive_failure_count() {
        let b = breaker(3);
        b.record_failure(false);
        b.record_failure(false);
        b.record_success(false);
        assert_eq!(b.stats().consecutive_failures, 0);
        b.record_failure(false);
        b.record_failure(false);
        assert_eq!(b.stats().state, CircuitState::Closed);
    }

    #[test]
    fn recovers_through_half_open_to_closed() {
        let b = breaker(1);
        b.record_failure(false);
        assert_eq!(
            b.allow(),
            Admission::Rejected(Rejection::CircuitOpen)
        );
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(b.allow(), Admission::Admitted { half_open: true });
        b.record_success(true);
        assert_eq!(b.stats().state, CircuitState::HalfOpen);
        assert_eq!(b.allow(), Admission::Admitted { half_open: true });
        b.record_success(true);
        assert_eq!(b.stats().state, CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let b = breaker(1);
        b.record_failure(false);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(b.allow(), Admission::Admitted { half_open: true });
        b.record_failure(true);
        assert_eq!(b.stats().state, CircuitState::Open);
    }

    #[test]
    fn half_open_cap_admits_exactly_h_concurrent_probes() {
        let b = Breaker::new(BreakerConfig {
            failure_threshold: 1,
            success_threshold: 5,
            open_timeout: Duration::from_millis(10),
            max_half_open_requests: 3,
        });
        b.record_failure(false);
        std::thread::sleep(Duration::from_millis(20));

        let admitted = (0..10).filter(|_| matches!(b.allow(), Admission::Admitted { .. })).count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn no_transition_on_cancellation_release() {
        let b = breaker(1);
        std::thread::sleep(Duration::from_millis(1));
        let before = b.stats();
        b.release_half_open_slot();
        let after = b.stats();
        assert_eq!(before.state, after.state);
        assert_eq!(before.total_failures, after.total_failures);
        assert_eq!(before.total_successes, after.total_successes);
    }
}
