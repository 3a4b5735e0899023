//! Circuit breaker over whole reconciliation cycles.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    /// The cooldown has elapsed and one trial cycle is in flight.
    HalfOpen,
}

/// Process-local breaker state.
///
/// Opens after `threshold` consecutive failed cycles. While open no cycle is
/// admitted; once `cooldown` has passed since the last failure exactly one
/// trial cycle is admitted, whose outcome closes or re-opens the circuit.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_errors: u32,
    last_error_at: Option<Instant>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_errors: 0,
            last_error_at: None,
            threshold: threshold.max(1),
            cooldown,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Whether a cycle may run at `now`. Moves an open circuit whose cooldown
    /// has elapsed to half-open; a half-open circuit admits nothing further
    /// until the trial is recorded.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let cooled = self
                    .last_error_at
                    .is_none_or(|at| now.saturating_duration_since(at) >= self.cooldown);
                if cooled {
                    self.state = CircuitState::HalfOpen;
                }
                cooled
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!("Circuit closed after successful trial");
        }
        self.state = CircuitState::Closed;
        self.consecutive_errors = 0;
        self.last_error_at = None;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.last_error_at = Some(now);

        let reopen = match self.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => self.consecutive_errors >= self.threshold,
            CircuitState::Open => false,
        };
        if reopen {
            tracing::warn!(
                consecutive_errors = self.consecutive_errors,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit opened, pausing reconciliation"
            );
            self.state = CircuitState::Open;
        }
    }
}
