//! Circuit breaker guarding the persistence backend.
//!
//! CLOSED passes every operation through. Consecutive failures inside a
//! rolling window trip the breaker to OPEN, where operations are refused
//! without touching the backend. After a cooldown one probe operation is let
//! through (HALF_OPEN): success closes the circuit, failure re-opens it and
//! restarts the cooldown.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures within `window` that trip the breaker.
    pub failure_threshold: u32,
    /// Rolling window for counting consecutive failures.
    pub window: Duration,
    /// Time spent OPEN before a single probe is allowed.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(30),
            cooldown: Duration::from_secs(15),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    window_start: Option<Instant>,
    opened_at: Option<Instant>,
    /// True while the single HALF_OPEN probe is outstanding.
    probe_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                window_start: None,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether an operation may proceed right now. Callers that get `true`
    /// must report the outcome via record_success/record_failure; in
    /// HALF_OPEN the caller holds the only probe slot.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|t| t.elapsed() >= self.config.cooldown);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!("[STORE BREAKER] half-open, sending probe");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(
                from = inner.state.as_str(),
                "[STORE BREAKER] closed after successful operation"
            );
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.window_start = None;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                warn!("[STORE BREAKER] probe failed, re-opened");
            }
            CircuitState::Open => {
                // Already open; nothing to count.
            }
            CircuitState::Closed => {
                let now = Instant::now();
                let window_expired = inner
                    .window_start
                    .is_none_or(|start| now.duration_since(start) > self.config.window);
                if window_expired {
                    inner.window_start = Some(now);
                    inner.consecutive_failures = 1;
                } else {
                    inner.consecutive_failures += 1;
                }
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    warn!(
                        failures = inner.consecutive_failures,
                        "[STORE BREAKER] opened after consecutive failures"
                    );
                }
            }
        }
    }
}
