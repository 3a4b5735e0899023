//! Latency-driven page size.

use std::collections::VecDeque;
use std::time::Duration;

/// Number of recent cycles the mean is taken over.
const WINDOW: usize = 10;

/// Page size that tracks recent cycle latency.
///
/// When the mean of the last [`WINDOW`] cycle durations exceeds 70% of the
/// poll interval the size shrinks by 20%, otherwise it grows by 20%. The
/// result is always within `[min, max]`.
#[derive(Debug, Clone)]
pub struct AdaptiveBatch {
    size: usize,
    min: usize,
    max: usize,
    poll_interval: Duration,
    samples: VecDeque<Duration>,
}

impl AdaptiveBatch {
    pub fn new(initial: usize, min: usize, max: usize, poll_interval: Duration) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        Self {
            size: initial.clamp(min, max),
            min,
            max,
            poll_interval,
            samples: VecDeque::with_capacity(WINDOW),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Record a cycle duration and adjust the size. Returns the new size.
    pub fn record(&mut self, elapsed: Duration) -> usize {
        if self.samples.len() == WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed);

        let total: Duration = self.samples.iter().sum();
        let mean = total / self.samples.len() as u32;
        let budget = self.poll_interval.mul_f64(0.7);

        let next = if mean > budget {
            // floor(size * 0.8)
            self.size * 4 / 5
        } else {
            // ceil(size * 1.2)
            (self.size * 6).div_ceil(5)
        };
        self.size = next.clamp(self.min, self.max);
        self.size
    }
}
