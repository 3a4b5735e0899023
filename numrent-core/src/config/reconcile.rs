//! Reconciliation engine tuning.

use std::time::Duration;

/// Timing and sizing knobs for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Interval between reconciliation cycles.
    pub poll_interval: Duration,
    /// Interval between countdown refreshes of pending deposit messages.
    pub countdown_interval: Duration,
    /// Smallest page of pending deposits fetched per round trip.
    pub min_batch: usize,
    /// Largest page of pending deposits fetched per round trip.
    pub max_batch: usize,
    /// Consecutive failed cycles before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a half-open trial.
    pub cooldown: Duration,
}

impl ReconcileConfig {
    /// Batch size the engine starts with before any latency is observed.
    pub fn initial_batch(&self) -> usize {
        self.min_batch.max(self.max_batch / 2)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            countdown_interval: Duration::from_secs(60),
            min_batch: 10,
            max_batch: 100,
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}
