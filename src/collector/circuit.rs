//! Circuit breaker isolating a failing upstream from starving a whole
//! collection run with timeouts. Opens after a run of consecutive
//! failures, rejects for a cooldown window, then lets one probe through.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    state: CircuitState,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                last_failure: None,
                state: CircuitState::Closed,
            }),
        }
    }

    /// Default production policy: 5 consecutive failures, 60s cooldown.
    pub fn default_policy() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    /// True while the breaker rejects calls. Once the cooldown has elapsed
    /// the breaker moves to half-open and lets the next attempt probe the
    /// upstream.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Open => {
                let cooled = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if cooled {
                    info!("Circuit cooldown elapsed, moving to half-open");
                    inner.state = CircuitState::HalfOpen;
                    false
                } else {
                    true
                }
            }
            CircuitState::Closed | CircuitState::HalfOpen => false,
        }
    }

    /// Any single success fully resets the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != CircuitState::Closed {
            info!("Circuit reset to closed after success");
        }
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        inner.state = CircuitState::Closed;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());
        // A half-open probe failure reopens immediately.
        if inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold
        {
            if inner.state != CircuitState::Open {
                warn!(
                    "Circuit opened after {} consecutive failures",
                    inner.consecutive_failures
                );
            }
            inner.state = CircuitState::Open;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_failures
    }
}
