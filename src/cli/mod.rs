//! Command-line interface

use crate::models::parse_duration;
use crate::types::NameValue;
use clap::{ArgAction, ArgGroup, Parser};
use std::time::Duration;

/// Measure HTTP(S) latency with a per-phase breakdown
#[derive(Parser, Debug, Clone)]
#[command(name = "http-ping")]
#[command(version = crate::VERSION, long_version = crate::LONG_VERSION, about, long_about = None)]
#[command(group(ArgGroup::new("http_version").args(["http1", "http2", "http3"])))]
#[command(group(ArgGroup::new("ip_version").args(["ipv4", "ipv6"])))]
#[command(group(ArgGroup::new("resolver").args(["full_dns", "dns_server", "doh_url"])))]
#[command(group(ArgGroup::new("output_level").args(["quiet", "verbose"])))]
pub struct Cli {
    /// Target URL; https:// is assumed when no scheme is given
    pub target: Option<String>,

    /// Number of requests to send (unbounded by default)
    #[arg(short, long)]
    pub count: Option<u64>,

    /// Pause between requests, e.g. 500ms, 1s, 2m
    #[arg(short, long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Maximum time to wait for a complete response
    #[arg(short, long, value_parser = parse_duration)]
    pub wait: Option<Duration>,

    /// HTTP method (GET or HEAD)
    #[arg(long, value_parser = ["GET", "HEAD", "get", "head"])]
    pub method: Option<String>,

    /// User-Agent header
    #[arg(short = 'u', long)]
    pub user_agent: Option<String>,

    /// Open a new connection for every request
    #[arg(short = 'K', long = "disable-keepalive")]
    pub disable_keepalive: bool,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Do not ask for compressed responses
    #[arg(long)]
    pub disable_compression: bool,

    /// Cookie to send, as name:value or name=value (repeatable)
    #[arg(long = "cookie", action = ArgAction::Append)]
    pub cookies: Vec<NameValue>,

    /// Extra header, as name:value (repeatable); Host overrides the request authority
    #[arg(short = 'H', long = "header", action = ArgAction::Append)]
    pub headers: Vec<NameValue>,

    /// Query parameter, as name:value or name=value (repeatable)
    #[arg(long = "parameter", action = ArgAction::Append)]
    pub parameters: Vec<NameValue>,

    /// Count 5xx responses as answers
    #[arg(long)]
    pub ignore_server_errors: bool,

    /// Add a cache-busting query parameter to every request
    #[arg(short = 'x', long = "extra-parameter")]
    pub extra_parameter: bool,

    /// Referer header
    #[arg(long)]
    pub referrer: Option<String>,

    /// Basic authentication user
    #[arg(long)]
    pub user: Option<String>,

    /// Basic authentication password
    #[arg(long)]
    pub password: Option<String>,

    /// Force HTTP/1.1
    #[arg(long = "http1")]
    pub http1: bool,

    /// Force HTTP/2
    #[arg(long = "http2")]
    pub http2: bool,

    /// Force HTTP/3 over QUIC
    #[arg(long = "http3")]
    pub http3: bool,

    /// Resolve to IPv4 addresses only
    #[arg(short = '4', long = "ipv4")]
    pub ipv4: bool,

    /// Resolve to IPv6 addresses only
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Connect to host:port instead of the URL authority
    #[arg(long = "resolve", visible_alias = "conn-target", value_name = "HOST:PORT")]
    pub conn_target: Option<String>,

    /// Resolve names iteratively from the root servers
    #[arg(long)]
    pub full_dns: bool,

    /// Query this DNS server directly (ip or ip:port)
    #[arg(long)]
    pub dns_server: Option<String>,

    /// Resolve names with DNS-over-HTTPS at this URL
    #[arg(long)]
    pub doh_url: Option<String>,

    /// Cache resolved addresses between requests
    #[arg(long)]
    pub cache_dns: bool,

    /// Resend cookies set by the server
    #[arg(long)]
    pub keep_cookies: bool,

    /// Follow redirects
    #[arg(short = 'L', long)]
    pub follow_redirects: bool,

    /// Number of concurrent workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Print query throughput instead of per-request lines
    #[arg(long)]
    pub throughput: bool,

    /// Throughput refresh period
    #[arg(long, value_parser = parse_duration)]
    pub throughput_refresh: Option<Duration>,

    /// Print only the final statistics
    #[arg(short, long)]
    pub quiet: bool,

    /// Print connection details and latency breakdowns
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logs
    #[arg(long)]
    pub debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Ring the terminal bell on every answer
    #[arg(short = 'a', long)]
    pub audible_bell: bool,
}

impl Cli {
    /// Check flag combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.user.is_none() && self.password.is_some() {
            return Err("--password requires --user".to_string());
        }
        if self.throughput_refresh.is_some() && !self.throughput {
            return Err("--throughput-refresh requires --throughput".to_string());
        }
        Ok(())
    }

    /// Whether colors should be used on this terminal
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}
