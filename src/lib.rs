//! HTTP Ping
//!
//! Measures HTTP(S) request latency against a single target, probe after
//! probe, with a per-phase breakdown (DNS, TCP, TLS, QUIC, request,
//! wait, response) over HTTP/1.1, HTTP/2 or HTTP/3.

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod dns;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod output;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use app::HttpPing;
pub use client::{ProbeClient, WebClient};
pub use error::{AppError, Result};
pub use executor::{PingSource, Pinger};
pub use logging::{ConsoleSink, LineSink, Logger, MemorySink};
pub use models::{Config, Measurement, RuntimeConfig};
pub use stats::{Measure, MeasuresCollection, PingStats, SpanKind};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Version with build metadata, shown by `--version`
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nbuilt: ",
    env!("BUILD_TIME"),
    "\ncommit: ",
    env!("GIT_COMMIT")
);

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// No target by default; one must come from the command line or `HTTP_PING_TARGET`
    pub const DEFAULT_TARGET: &str = "";
    pub const DEFAULT_METHOD: &str = "GET";
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);
    pub const DEFAULT_COUNT: u64 = u64::MAX;
    pub const DEFAULT_WORKERS: usize = 1;
    pub const DEFAULT_THROUGHPUT_REFRESH: Duration = Duration::from_secs(1);
    pub const DEFAULT_ENABLE_COLOR: bool = true;
    pub const DNS_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
}
