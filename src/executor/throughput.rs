//! Periodic rate and latency aggregation

use crate::stats::Measure;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What was counted since the previous sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub elapsed: Duration,
    pub count: u64,
    pub summed_latency: Measure,
}

impl ThroughputSample {
    /// Queries per second over the window
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.count as f64 / secs
    }

    /// Mean latency of the counted queries, invalid when nothing was counted
    pub fn average_latency(&self) -> Measure {
        if self.count == 0 {
            return Measure::NOT_INITIALIZED;
        }
        self.summed_latency.divide(self.count as i64)
    }
}

#[derive(Debug)]
struct WindowState {
    last_sample: Instant,
    count: u64,
    summed_latency: Measure,
}

/// Request counter that an external ticker samples and resets
#[derive(Debug)]
pub struct ThroughputWindow {
    state: Mutex<WindowState>,
}

impl ThroughputWindow {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            state: Mutex::new(WindowState {
                last_sample: now,
                count: 0,
                summed_latency: Measure::NOT_INITIALIZED,
            }),
        }
    }

    /// Count one query with its latency
    pub fn count(&self, latency: Measure) {
        if let Ok(mut state) = self.state.lock() {
            state.count += 1;
            state.summed_latency = state.summed_latency.sum_if_valid(latency);
        }
    }

    /// Read and reset the window
    pub fn sample(&self) -> ThroughputSample {
        self.sample_at(Instant::now())
    }

    fn sample_at(&self, now: Instant) -> ThroughputSample {
        let Ok(mut state) = self.state.lock() else {
            return ThroughputSample {
                elapsed: Duration::ZERO,
                count: 0,
                summed_latency: Measure::NOT_INITIALIZED,
            };
        };
        let sample = ThroughputSample {
            elapsed: now.saturating_duration_since(state.last_sample),
            count: state.count,
            summed_latency: state.summed_latency,
        };
        state.last_sample = now;
        state.count = 0;
        state.summed_latency = Measure::NOT_INITIALIZED;
        sample
    }
}

impl Default for ThroughputWindow {
    fn default() -> Self {
        Self::new()
    }
}
