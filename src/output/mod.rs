//! Operator-facing probe output
//!
//! Reporters turn the measurement stream into text lines written to a
//! `LineSink`. Three levels exist: quiet (statistics only), standard (one
//! line per probe) and verbose (connection details and span breakdowns).

mod colored;
mod formatter;
mod verbose;

pub use self::colored::{ColorScheme, Painter, PerformanceLevel};
pub use formatter::{format_count, CloseSummary, LineFormatter, INDENT};
pub use verbose::{draw_breakdown, VerboseReporter};

use crate::executor::ThroughputSample;
use crate::logging::{LineSink, LogLevel};
use crate::models::{Config, Measurement};
use crate::types::Verbosity;
use std::sync::Arc;

/// Consumer of probe results
pub trait PingReporter: Send {
    /// One measurement; `id` counts attempts from zero
    fn on_measure(&mut self, measurement: &Measurement, id: u64);

    /// A throughput window sample
    fn on_tick(&mut self, sample: &ThroughputSample);

    /// The run is over
    fn on_close(&mut self, url: &str, summary: &CloseSummary);
}

/// Prints only the final statistics
pub struct QuietReporter {
    formatter: LineFormatter,
    sink: Arc<dyn LineSink>,
}

impl QuietReporter {
    pub fn new(formatter: LineFormatter, sink: Arc<dyn LineSink>) -> Self {
        Self { formatter, sink }
    }
}

impl PingReporter for QuietReporter {
    fn on_measure(&mut self, _measurement: &Measurement, _id: u64) {}

    fn on_tick(&mut self, _sample: &ThroughputSample) {}

    fn on_close(&mut self, url: &str, summary: &CloseSummary) {
        for line in self.formatter.close_lines(url, summary) {
            self.sink.write_line(LogLevel::Info, &line);
        }
    }
}

/// One line per probe
pub struct StandardReporter {
    formatter: LineFormatter,
    sink: Arc<dyn LineSink>,
    throughput: bool,
    audible_bell: bool,
}

impl StandardReporter {
    pub fn new(formatter: LineFormatter, sink: Arc<dyn LineSink>, throughput: bool, audible_bell: bool) -> Self {
        Self { formatter, sink, throughput, audible_bell }
    }
}

impl PingReporter for StandardReporter {
    fn on_measure(&mut self, measurement: &Measurement, id: u64) {
        // throughput mode replaces per-probe lines with periodic samples
        if self.throughput {
            return;
        }
        self.sink.write_line(LogLevel::Info, &self.formatter.probe_line(id, measurement));
        if self.audible_bell && measurement.is_success() {
            self.sink.write_line(LogLevel::Info, "\x07");
        }
    }

    fn on_tick(&mut self, sample: &ThroughputSample) {
        self.sink.write_line(LogLevel::Info, &self.formatter.throughput_line(sample));
    }

    fn on_close(&mut self, url: &str, summary: &CloseSummary) {
        self.sink.write_line(LogLevel::Info, "");
        for line in self.formatter.close_lines(url, summary) {
            self.sink.write_line(LogLevel::Info, &line);
        }
    }
}

/// Build the reporter matching the configured verbosity
pub fn create_reporter(config: &Config, sink: Arc<dyn LineSink>) -> Box<dyn PingReporter> {
    let formatter = LineFormatter::new(Painter::new(config.enable_color));
    match config.verbosity {
        Verbosity::Quiet => Box::new(QuietReporter::new(formatter, sink)),
        Verbosity::Standard => {
            Box::new(StandardReporter::new(formatter, sink, config.throughput, config.audible_bell))
        }
        Verbosity::Verbose => {
            Box::new(VerboseReporter::new(formatter, sink, config.throughput, config.audible_bell))
        }
    }
}
