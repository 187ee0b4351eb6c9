//! Round-trip statistics over a series of probe latencies

use super::measure::Measure;
use serde::Serialize;
use std::fmt;

/// min/avg/max/stddev of the successful latencies, population standard deviation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PingStats {
    pub min: Measure,
    pub average: Measure,
    pub max: Measure,
    pub std_dev: Measure,
    pub count: usize,
}

impl PingStats {
    /// Compute statistics; failed (negative or sentinel) latencies are skipped
    pub fn from_latencies(measures: &[Measure]) -> Self {
        let successes: Vec<i64> = measures
            .iter()
            .filter(|m| m.is_success())
            .map(|m| m.as_nanos())
            .collect();

        if successes.is_empty() {
            return Self {
                min: Measure::NOT_INITIALIZED,
                average: Measure::NOT_INITIALIZED,
                max: Measure::NOT_INITIALIZED,
                std_dev: Measure::NOT_INITIALIZED,
                count: 0,
            };
        }

        let count = successes.len() as f64;
        let sum: f64 = successes.iter().map(|v| *v as f64).sum();
        let average = sum / count;
        let variance = successes
            .iter()
            .map(|v| {
                let diff = *v as f64 - average;
                diff * diff
            })
            .sum::<f64>()
            / count;

        Self {
            min: Measure::from_nanos(successes.iter().copied().min().unwrap_or_default()),
            average: Measure::from_nanos(average.round() as i64),
            max: Measure::from_nanos(successes.iter().copied().max().unwrap_or_default()),
            std_dev: Measure::from_nanos(variance.sqrt().round() as i64),
            count: successes.len(),
        }
    }
}

impl fmt::Display for PingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round-trip min/avg/max/stddev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            self.min.as_millis_f64(),
            self.average.as_millis_f64(),
            self.max.as_millis_f64(),
            self.std_dev.as_millis_f64()
        )
    }
}
