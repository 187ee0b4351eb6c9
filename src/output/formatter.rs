//! Line formatting shared by every reporter

use super::colored::Painter;
use crate::executor::ThroughputSample;
use crate::models::Measurement;
use crate::stats::PingStats;

/// Indentation of continuation lines under a probe line
pub const INDENT: &str = "          ";

/// Totals handed to a reporter when the run ends
#[derive(Debug, Clone, PartialEq)]
pub struct CloseSummary {
    pub attempts: u64,
    pub successes: u64,
    pub stats: PingStats,
}

impl CloseSummary {
    /// Percentage of attempts without a successful answer
    pub fn loss_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        100.0 * (self.attempts - self.successes) as f64 / self.attempts as f64
    }
}

/// Renders the standard one-line output
#[derive(Debug, Clone)]
pub struct LineFormatter {
    painter: Painter,
}

impl LineFormatter {
    pub fn new(painter: Painter) -> Self {
        Self { painter }
    }

    pub fn painter(&self) -> &Painter {
        &self.painter
    }

    pub fn start_line(&self, url: &str, method: &str) -> String {
        format!("{} {} {}", self.painter.header("HTTP-PING"), url, method)
    }

    pub fn probe_line(&self, id: u64, measurement: &Measurement) -> String {
        if measurement.is_failure {
            return self.error_line(id, &measurement.failure_cause);
        }
        let time_ms = measurement.latency().as_millis_f64();
        let remote = measurement
            .remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        format!(
            "{:8}: {}, code={}, size={} bytes, time={}",
            id,
            remote,
            self.painter.status(measurement.status_code),
            measurement.payload_size,
            self.painter.latency(&format!("{:.1} ms", time_ms), time_ms)
        )
    }

    pub fn error_line(&self, id: u64, cause: &str) -> String {
        format!("{:8}: {} {}", id, self.painter.error("Error:"), cause)
    }

    pub fn throughput_line(&self, sample: &ThroughputSample) -> String {
        format!(
            "{}throughput: {:.1} queries/sec, average latency: {:.1} ms",
            INDENT,
            sample.rate(),
            sample.average_latency().as_millis_f64()
        )
    }

    /// Statistics block printed when the run ends
    pub fn close_lines(&self, url: &str, summary: &CloseSummary) -> Vec<String> {
        let mut lines = vec![
            self.painter.header(&format!("--- {} ping statistics ---", url)),
            format!(
                "{} requests sent, {} answers received, {:.1}% loss",
                summary.attempts,
                summary.successes,
                summary.loss_rate()
            ),
        ];
        if summary.successes > 0 {
            lines.push(summary.stats.to_string());
        }
        lines
    }
}

/// Byte count with a decimal unit, e.g. `1.5 kB`
pub fn format_count(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['k', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, prefix)
}
