//! Application run loop: consumes the measurement stream and drives a reporter

use crate::{
    error::Result,
    executor::{PingSource, Pinger, ThroughputWindow},
    logging::{LineSink, LogLevel, Logger},
    models::{Config, RuntimeConfig},
    output::{create_reporter, CloseSummary, LineFormatter, Painter, PingReporter},
    stats::{Measure, PingStats},
};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval_at, Instant, Interval};

/// Main application struct tying a ping source to a reporter
pub struct HttpPing {
    config: Config,
    sink: Arc<dyn LineSink>,
    source: Box<dyn PingSource>,
    reporter: Box<dyn PingReporter>,
    logger: Logger,
}

impl HttpPing {
    /// Build the application with a pinger for `config.target`
    pub fn new(config: Config, sink: Arc<dyn LineSink>) -> Result<Self> {
        let redirect_sink = sink.clone();
        let runtime = RuntimeConfig::new(&config, sink.clone()).with_redirect_callback(move |url| {
            redirect_sink.write_line(LogLevel::Info, &format!("   ─→     Redirected to {}\n", url));
        });
        let pinger = Pinger::new(&config, &runtime)?;
        Ok(Self::with_source(config, runtime, Box::new(pinger)))
    }

    /// Build the application around any ping source
    pub fn with_source(config: Config, runtime: RuntimeConfig, source: Box<dyn PingSource>) -> Self {
        Self {
            reporter: create_reporter(&config, runtime.sink.clone()),
            logger: runtime.logger.named("APP"),
            sink: runtime.sink,
            config,
            source,
        }
    }

    /// Run until the stream ends or Ctrl-C is pressed
    pub async fn run(self) -> Result<CloseSummary> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Run until the stream ends or `shutdown` resolves
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<CloseSummary>
    where
        F: Future<Output = ()>,
    {
        let formatter = LineFormatter::new(Painter::new(self.config.enable_color));
        self.sink
            .write_line(LogLevel::Info, &formatter.start_line(&self.source.url(), &self.config.method.to_uppercase()));
        self.sink.write_line(LogLevel::Info, "");

        let mut measurements = self.source.ping()?;
        let window = ThroughputWindow::new();
        let mut ticker: Option<Interval> = None;
        let mut attempts = 0u64;
        let mut latencies: Vec<Measure> = Vec::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    self.logger.debug("Shutdown requested").log().await;
                    self.source.stop();
                    break;
                }
                _ = next_tick(&mut ticker) => {
                    self.reporter.on_tick(&window.sample());
                }
                received = measurements.recv() => {
                    let Some(measurement) = received else { break };
                    self.reporter.on_measure(&measurement, attempts);
                    attempts += 1;

                    if measurement.is_success() {
                        if self.config.throughput && ticker.is_none() {
                            window.sample();
                            let refresh = self.config.throughput_refresh;
                            ticker = Some(interval_at(Instant::now() + refresh, refresh));
                        }
                        window.count(measurement.latency());
                        latencies.push(measurement.latency());
                    }
                }
            }
        }

        let summary = CloseSummary {
            attempts,
            successes: latencies.len() as u64,
            stats: PingStats::from_latencies(&latencies),
        };
        self.logger.debug("Run finished")
            .field("attempts", summary.attempts)
            .field("successes", summary.successes)
            .log()
            .await;
        self.reporter.on_close(&self.source.url(), &summary);
        Ok(summary)
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::models::Measurement;
    use crate::stats::{MeasuresCollection, SpanKind};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ScriptedSource {
        measurements: Vec<Measurement>,
        hold_open: bool,
        keep_alive: Option<mpsc::Sender<Measurement>>,
    }

    impl PingSource for ScriptedSource {
        fn url(&self) -> String {
            "http://scripted.test/".to_string()
        }

        fn ping(&mut self) -> Result<mpsc::Receiver<Measurement>> {
            let (tx, rx) = mpsc::channel(self.measurements.len().max(1));
            for measurement in self.measurements.drain(..) {
                let _ = tx.try_send(measurement);
            }
            if self.hold_open {
                self.keep_alive = Some(tx);
            }
            Ok(rx)
        }

        fn stop(&self) {}
    }

    fn success(ms: u64) -> Measurement {
        let mut measures = MeasuresCollection::new();
        measures.set(SpanKind::Total, Measure::from(Duration::from_millis(ms)));
        Measurement { status_code: 200, measures, ..Default::default() }
    }

    fn app(measurements: Vec<Measurement>, hold_open: bool, sink: Arc<MemorySink>) -> HttpPing {
        let mut config = Config::for_target("http://scripted.test/");
        config.enable_color = false;
        let runtime = RuntimeConfig::new(&config, sink);
        HttpPing::with_source(config, runtime, Box::new(ScriptedSource { measurements, hold_open, keep_alive: None }))
    }

    #[tokio::test]
    async fn test_summary_counts_failures() {
        let sink = Arc::new(MemorySink::new());
        let measurements = vec![success(10), Measurement::failure("Server-side error", MeasuresCollection::new()), success(30)];
        let summary = app(measurements, false, sink.clone())
            .run_until(std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.successes, 2);
        let contents = sink.contents();
        assert!(contents.starts_with("HTTP-PING http://scripted.test/ GET"));
        assert!(contents.contains("       1: Error: Server-side error"));
        assert!(contents.contains("3 requests sent, 2 answers received, 33.3% loss"));
        assert!(contents.contains("round-trip min/avg/max/stddev = 10.000/20.000/30.000/10.000 ms"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_run() {
        let sink = Arc::new(MemorySink::new());
        let summary = app(vec![success(5)], true, sink.clone())
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(summary.attempts, 1);
        assert!(sink.contents().contains("--- http://scripted.test/ ping statistics ---"));
    }
}
