//! Configuration data model and validation

use crate::error::{AppError, Result};
use crate::logging::{ConsoleSink, LineSink, LogLevel, Logger};
use crate::types::{DnsStrategy, HttpVersion, IpProtocol, NameValue, Verbosity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target URL
    #[serde(default = "default_target")]
    pub target: String,

    /// HTTP method, GET or HEAD
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Pause between probes of one worker
    #[serde(default = "default_interval")]
    pub interval: Duration,

    /// Per-probe deadline
    #[serde(default = "default_wait")]
    pub wait: Duration,

    /// Timed probes per worker
    #[serde(default = "default_count")]
    pub count: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub ip_protocol: IpProtocol,

    /// Dial this `host:port` instead of the URL authority
    #[serde(default)]
    pub conn_target: Option<String>,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,

    #[serde(default)]
    pub disable_keep_alive: bool,

    #[serde(default)]
    pub http_version: HttpVersion,

    #[serde(default)]
    pub cookies: Vec<NameValue>,

    #[serde(default)]
    pub headers: Vec<NameValue>,

    /// Extra query parameters
    #[serde(default)]
    pub parameters: Vec<NameValue>,

    #[serde(default)]
    pub ignore_server_errors: bool,

    /// Append a cache-busting query parameter to every probe
    #[serde(default)]
    pub extra_param: bool,

    #[serde(default)]
    pub disable_compression: bool,

    #[serde(default)]
    pub audible_bell: bool,

    #[serde(default)]
    pub referrer: Option<String>,

    #[serde(default)]
    pub auth_username: Option<String>,

    #[serde(default)]
    pub auth_password: Option<String>,

    #[serde(default)]
    pub dns: DnsStrategy,

    /// Keep resolved addresses for the life of the transport
    #[serde(default)]
    pub cache_dns: bool,

    /// Resend cookies received from the server
    #[serde(default)]
    pub keep_cookies: bool,

    #[serde(default)]
    pub follow_redirects: bool,

    /// Print periodic throughput instead of one line per probe
    #[serde(default)]
    pub throughput: bool,

    #[serde(default = "default_throughput_refresh")]
    pub throughput_refresh: Duration,

    #[serde(default)]
    pub verbosity: Verbosity,

    /// Explicit log level, overrides the debug/verbose mapping
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: default_target(),
            method: default_method(),
            user_agent: default_user_agent(),
            interval: default_interval(),
            wait: default_wait(),
            count: default_count(),
            workers: default_workers(),
            ip_protocol: IpProtocol::Any,
            conn_target: None,
            insecure: false,
            disable_keep_alive: false,
            http_version: HttpVersion::Auto,
            cookies: Vec::new(),
            headers: Vec::new(),
            parameters: Vec::new(),
            ignore_server_errors: false,
            extra_param: false,
            disable_compression: false,
            audible_bell: false,
            referrer: None,
            auth_username: None,
            auth_password: None,
            dns: DnsStrategy::System,
            cache_dns: false,
            keep_cookies: false,
            follow_redirects: false,
            throughput: false,
            throughput_refresh: default_throughput_refresh(),
            verbosity: Verbosity::Standard,
            log_level: None,
            enable_color: default_enable_color(),
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration probing `target` with every other setting at its default
    pub fn for_target<S: AsRef<str>>(target: S) -> Self {
        Self {
            target: normalize_target(target.as_ref()),
            ..Self::default()
        }
    }

    pub fn keep_alive(&self) -> bool {
        !self.disable_keep_alive
    }

    pub fn verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Parsed target URL
    pub fn target_url(&self) -> Result<Url> {
        Url::parse(&self.target)
            .map_err(|e| AppError::config(format!("Invalid target URL '{}': {}", self.target, e)))
    }

    /// Minimum level for diagnostic logs
    pub fn effective_log_level(&self) -> LogLevel {
        if let Some(level) = self.log_level.as_deref().and_then(|l| LogLevel::from_str(l).ok()) {
            return level;
        }
        if self.debug {
            LogLevel::Debug
        } else if self.verbose() {
            LogLevel::Info
        } else {
            LogLevel::Warn
        }
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(AppError::config("Target URL cannot be empty"));
        }

        let url = self.target_url()?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(AppError::config(format!("Unsupported URL scheme '{}'", other)));
            }
        }
        if url.host_str().is_none() {
            return Err(AppError::config(format!("Target URL has no host: {}", self.target)));
        }

        if http::Method::from_bytes(self.method.as_bytes()).is_err() {
            return Err(AppError::config(format!("Invalid HTTP method: {}", self.method)));
        }

        if self.http_version == HttpVersion::Http3 && url.scheme() != "https" {
            return Err(AppError::config("HTTP/3 requires an https:// target"));
        }

        self.dns.validate()?;

        if let Some(conn_target) = &self.conn_target {
            if !conn_target.contains(':') {
                return Err(AppError::config(format!(
                    "Connection target must be host:port, got '{}'",
                    conn_target
                )));
            }
        }

        if let Some(level) = &self.log_level {
            LogLevel::from_str(level)
                .map_err(|_| AppError::config(format!("Invalid log level: {}", level)))?;
        }

        if self.count == 0 {
            return Err(AppError::config("Count must be greater than 0"));
        }

        if self.workers == 0 {
            return Err(AppError::config("Workers must be greater than 0"));
        }

        if self.wait.is_zero() {
            return Err(AppError::config("Wait must be greater than 0"));
        }

        if self.throughput && self.throughput_refresh.is_zero() {
            return Err(AppError::config("Throughput refresh must be greater than 0"));
        }

        Ok(())
    }

    /// Merge `HTTP_PING_*` environment variables into the config
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(target) = std::env::var("HTTP_PING_TARGET") {
            self.target = normalize_target(target.trim());
        }

        if let Ok(count) = std::env::var("HTTP_PING_COUNT") {
            self.count = count.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid HTTP_PING_COUNT value '{}': {}", count, e)))?;
        }

        if let Ok(interval) = std::env::var("HTTP_PING_INTERVAL") {
            self.interval = parse_duration(&interval)
                .map_err(|e| AppError::config(format!("Invalid HTTP_PING_INTERVAL value: {}", e)))?;
        }

        if let Ok(wait) = std::env::var("HTTP_PING_WAIT") {
            self.wait = parse_duration(&wait)
                .map_err(|e| AppError::config(format!("Invalid HTTP_PING_WAIT value: {}", e)))?;
        }

        if let Ok(workers) = std::env::var("HTTP_PING_WORKERS") {
            self.workers = workers.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid HTTP_PING_WORKERS value '{}': {}", workers, e)))?;
        }

        if let Ok(server) = std::env::var("HTTP_PING_DNS_SERVER") {
            let server = server.trim();
            if !server.is_empty() {
                self.dns = DnsStrategy::Server(server.to_string());
            }
        }

        if let Ok(doh) = std::env::var("HTTP_PING_DOH_URL") {
            let doh = doh.trim();
            if !doh.is_empty() {
                self.dns = DnsStrategy::DoH(doh.to_string());
            }
        }

        if let Ok(user_agent) = std::env::var("HTTP_PING_USER_AGENT") {
            self.user_agent = user_agent;
        }

        if let Ok(enable_color) = std::env::var("HTTP_PING_ENABLE_COLOR") {
            self.enable_color = enable_color.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid HTTP_PING_ENABLE_COLOR value '{}': {}", enable_color, e)))?;
        }

        Ok(())
    }
}

/// Prefix `https://` when the target carries no scheme
pub fn normalize_target(target: &str) -> String {
    if target.contains("://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    }
}

/// Parse `250ms`, `1.5s`, `2m` or a bare number of seconds
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() || s.starts_with('+') || s.starts_with('-') {
        return Err(format!("Invalid duration: '{}'", s));
    }

    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("Invalid duration: '{}'", s))?;

    let seconds = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1_000.0,
        "us" | "µs" => value / 1_000_000.0,
        "m" => value * 60.0,
        "h" => value * 3_600.0,
        other => return Err(format!("Unknown duration unit '{}' in '{}'", other, s)),
    };

    Duration::try_from_secs_f64(seconds).map_err(|_| format!("Invalid duration: '{}'", s))
}

/// Non-serializable collaborators handed to the probing core
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Invoked with the new URL whenever a redirect is followed
    pub redirect_callback: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    /// Operator-facing status output
    pub sink: Arc<dyn LineSink>,
    pub logger: Logger,
}

impl RuntimeConfig {
    pub fn new(config: &Config, sink: Arc<dyn LineSink>) -> Self {
        Self {
            redirect_callback: None,
            logger: Logger::with_config("PING".to_string(), config, sink.clone()),
            sink,
        }
    }

    pub fn with_redirect_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.redirect_callback = Some(Arc::new(callback));
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(&Config::default(), Arc::new(ConsoleSink::new()))
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("redirect_callback", &self.redirect_callback.is_some())
            .finish()
    }
}

// Default value functions for serde
fn default_target() -> String {
    crate::defaults::DEFAULT_TARGET.to_string()
}

fn default_method() -> String {
    crate::defaults::DEFAULT_METHOD.to_string()
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::PKG_NAME, crate::VERSION)
}

fn default_interval() -> Duration {
    crate::defaults::DEFAULT_INTERVAL
}

fn default_wait() -> Duration {
    crate::defaults::DEFAULT_WAIT
}

fn default_count() -> u64 {
    crate::defaults::DEFAULT_COUNT
}

fn default_workers() -> usize {
    crate::defaults::DEFAULT_WORKERS
}

fn default_throughput_refresh() -> Duration {
    crate::defaults::DEFAULT_THROUGHPUT_REFRESH
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_err());

        let config = Config::for_target("example.com");
        assert!(config.validate().is_ok());
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.wait, Duration::from_secs(10));
        assert_eq!(config.workers, 1);
        assert!(config.keep_alive());
        assert!(config.user_agent.starts_with("http-ping/"));
    }

    #[test]
    fn test_target_normalization() {
        assert_eq!(normalize_target("example.com"), "https://example.com");
        assert_eq!(normalize_target("http://example.com"), "http://example.com");
        assert_eq!(Config::for_target("example.com/x").target, "https://example.com/x");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::for_target("ftp://example.com");
        assert!(config.validate().is_err());

        config = Config::for_target("http://example.com");
        config.http_version = HttpVersion::Http3;
        assert!(config.validate().is_err());

        config = Config::for_target("https://example.com");
        config.workers = 0;
        assert!(config.validate().is_err());

        config = Config::for_target("https://example.com");
        config.dns = DnsStrategy::Server("not-an-ip".into());
        assert!(config.validate().is_err());

        config = Config::for_target("https://example.com");
        config.method = "BAD METHOD".into();
        assert!(config.validate().is_err());

        config = Config::for_target("https://example.com");
        config.conn_target = Some("10.0.0.1".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_duration("1s"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("10 parsecs").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_effective_log_level() {
        let mut config = Config::default();
        assert_eq!(config.effective_log_level(), LogLevel::Warn);
        config.verbosity = Verbosity::Verbose;
        assert_eq!(config.effective_log_level(), LogLevel::Info);
        config.debug = true;
        assert_eq!(config.effective_log_level(), LogLevel::Debug);
        config.log_level = Some("error".into());
        assert_eq!(config.effective_log_level(), LogLevel::Error);
    }

    #[test]
    fn test_runtime_config_callback() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let captured = seen.clone();
        let runtime = RuntimeConfig::default()
            .with_redirect_callback(move |url| captured.lock().unwrap().push(url.to_string()));
        if let Some(callback) = &runtime.redirect_callback {
            callback("https://example.com/next");
        }
        assert_eq!(seen.lock().unwrap().as_slice(), ["https://example.com/next".to_string()]);
    }
}
