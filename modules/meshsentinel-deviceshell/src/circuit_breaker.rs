use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use meshsentinel_common::MeshError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    /// Timestamps of failures within the sliding window, oldest first.
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    /// Set while the single half-open trial call is in flight, so
    /// concurrent callers don't all get let through at once.
    half_open_trial_in_flight: bool,
}

/// Three-state failure gate in front of a `DeviceShell`'s transport
/// (spec §4.1). `allow()` must be called before attempting a command;
/// `on_success`/`on_failure` report the outcome afterwards.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    window: Duration,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                half_open_trial_in_flight: false,
            }),
            threshold,
            window,
            cooldown,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(3, Duration::from_secs(60), Duration::from_secs(30))
    }

    /// Must be called before attempting a transport operation. Returns
    /// `Err(CircuitOpen)` without touching the transport when the breaker
    /// is open and the cooldown hasn't elapsed.
    pub fn allow(&self) -> Result<(), MeshError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => Ok(()),
            State::Open => {
                let opened_at = inner.opened_at.expect("Open state always has opened_at");
                let elapsed = opened_at.elapsed();
                if elapsed >= self.cooldown {
                    inner.state = State::HalfOpen;
                    inner.half_open_trial_in_flight = true;
                    Ok(())
                } else {
                    Err(MeshError::CircuitOpen {
                        retry_after: self.cooldown - elapsed,
                    })
                }
            }
            State::HalfOpen => {
                if inner.half_open_trial_in_flight {
                    Err(MeshError::CircuitOpen {
                        retry_after: Duration::from_secs(0),
                    })
                } else {
                    inner.half_open_trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call. Closes the breaker if it was half-open;
    /// otherwise just clears the failure window.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.half_open_trial_in_flight = false;
    }

    /// Record a failed call. Re-opens immediately if the failing call was
    /// the half-open trial; otherwise counts it against the sliding
    /// window and opens once the threshold is crossed.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::HalfOpen {
            inner.state = State::Open;
            inner.opened_at = Some(Instant::now());
            inner.half_open_trial_in_flight = false;
            inner.failures.clear();
            return;
        }

        let now = Instant::now();
        inner.failures.push_back(now);
        while let Some(&front) = inner.failures.front() {
            if now.duration_since(front) > self.window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }

        if inner.failures.len() as u32 >= self.threshold {
            inner.state = State::Open;
            inner.opened_at = Some(now);
        }
    }

    /// Immediately mark non-retriable auth failures as opening the
    /// breaker, bypassing the threshold (spec §4.1: "AuthError is
    /// non-retriable and opens the breaker immediately").
    pub fn open_immediately(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Open;
        inner.opened_at = Some(Instant::now());
        inner.half_open_trial_in_flight = false;
    }

    /// `ResetCircuit()` — forces closed regardless of current state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.half_open_trial_in_flight = false;
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, State::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_allows_requests() {
        let cb = CircuitBreaker::with_defaults();
        assert!(cb.allow().is_ok());
    }

    #[test]
    fn opens_after_threshold_failures_within_window() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_secs(30));
        for _ in 0..3 {
            assert!(cb.allow().is_ok());
            cb.on_failure();
        }
        // Fourth call should be rejected without attempting the transport.
        assert!(matches!(cb.allow(), Err(MeshError::CircuitOpen { .. })));
    }

    #[test]
    fn reset_forces_closed() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60), Duration::from_secs(30));
        cb.on_failure();
        assert!(cb.is_open());
        cb.reset();
        assert!(!cb.is_open());
        assert!(cb.allow().is_ok());
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60), Duration::from_millis(10));
        cb.on_failure();
        assert!(cb.is_open());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow().is_ok()); // transitions to half-open, lets the trial through
        cb.on_success();
        assert!(!cb.is_open());
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(60), Duration::from_millis(10));
        cb.on_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow().is_ok());
        cb.on_failure();
        assert!(cb.is_open());
    }

    #[test]
    fn open_immediately_bypasses_threshold() {
        let cb = CircuitBreaker::new(10, Duration::from_secs(60), Duration::from_secs(30));
        cb.open_immediately();
        assert!(cb.is_open());
    }
}
