//! Circuit breaker guarding one historian endpoint.
//!
//! Closed (normal operation), Open (failing fast) and HalfOpen (a single trial
//! call decides). State and the failure counter live under one lock so
//! transitions are atomic with respect to counting.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tagscope_models::policy::CircuitState;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

/// Permission to make one network attempt. Report the outcome with
/// [`BreakerPermit::success`] or [`BreakerPermit::failure`]; dropping it
/// unreported releases a HalfOpen trial without changing state.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    reported: bool,
}

impl BreakerPermit<'_> {
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.reported {
            self.breaker.inner.lock().trial_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, cooldown: Duration) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold,
            cooldown_seconds = cooldown.as_secs(),
            "Circuit breaker initialized"
        );
        Self {
            name,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state. An open breaker whose cooldown has elapsed reports HalfOpen.
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) if at.elapsed() >= self.cooldown => CircuitState::HalfOpen,
            (state, _) => state,
        }
    }

    /// Ask to make a network attempt. `Err` carries how long until a trial is allowed.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, Duration> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(self.permit(false)),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or(self.cooldown);
                if elapsed >= self.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(component = %self.name, "Circuit breaker half-open, allowing trial call");
                    Ok(self.permit(true))
                } else {
                    Err(self.cooldown - elapsed)
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    debug!(component = %self.name, "Trial call in flight, rejecting");
                    Err(Duration::ZERO)
                } else {
                    inner.trial_in_flight = true;
                    Ok(self.permit(true))
                }
            }
        }
    }

    fn permit(&self, trial: bool) -> BreakerPermit<'_> {
        BreakerPermit {
            breaker: self,
            trial,
            reported: false,
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            inner.consecutive_failures = 0;
            info!(component = %self.name, "Circuit breaker closed after successful trial");
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        if trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(component = %self.name, "Trial call failed, circuit breaker reopened");
            return;
        }
        if inner.state != CircuitState::Closed {
            // Late failure from a call admitted before the breaker opened.
            return;
        }
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(
                component = %self.name,
                failures = inner.consecutive_failures,
                cooldown_seconds = self.cooldown.as_secs(),
                "Circuit breaker opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail_n(breaker: &CircuitBreaker, n: u32) {
        for _ in 0..n {
            breaker.try_acquire().unwrap().failure();
        }
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("historian", 3, Duration::from_secs(60));
        fail_n(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
        fail_n(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);

        let wait = breaker.try_acquire().err().unwrap();
        assert!(wait > Duration::from_secs(58));
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("historian", 3, Duration::from_secs(60));
        fail_n(&breaker, 2);
        breaker.try_acquire().unwrap().success();
        fail_n(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.inner.lock().consecutive_failures, 2);
    }

    #[test]
    fn half_open_admits_exactly_one_trial() {
        let breaker = CircuitBreaker::new("historian", 1, Duration::from_millis(20));
        fail_n(&breaker, 1);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let trial = breaker.try_acquire().unwrap();
        assert!(trial.trial);
        assert!(breaker.try_acquire().is_err());

        trial.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn failed_trial_reopens_and_restarts_cooldown() {
        let breaker = CircuitBreaker::new("historian", 1, Duration::from_millis(20));
        fail_n(&breaker, 1);
        std::thread::sleep(Duration::from_millis(40));
        breaker.try_acquire().unwrap().failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn dropped_trial_releases_slot() {
        let breaker = CircuitBreaker::new("historian", 1, Duration::from_millis(10));
        fail_n(&breaker, 1);
        std::thread::sleep(Duration::from_millis(30));
        drop(breaker.try_acquire().unwrap());
        assert!(breaker.try_acquire().unwrap().trial);
    }

    #[test]
    fn late_failures_do_not_extend_cooldown() {
        let breaker = CircuitBreaker::new("historian", 2, Duration::from_secs(60));
        let late = breaker.try_acquire().unwrap();
        fail_n(&breaker, 2);
        let before = breaker.try_acquire().err().unwrap();
        late.failure();
        let after = breaker.try_acquire().err().unwrap();
        assert!(after <= before);
    }
}
