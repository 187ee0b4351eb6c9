//! Structured logging for the HTTP latency prober
//!
//! This module provides:
//! - Structured log entries with levels, fields and correlation IDs
//! - Console, JSON and compact renderings
//! - A line-oriented sink abstraction so library code never writes to a terminal directly
//! - A probe-specific logger for network events

use crate::error::{AppError, Result};
use crate::models::{Config, Measurement};
use crate::stats::SpanKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - most detailed
    Trace = 0,
    /// Debug level - detailed information for debugging
    Debug = 1,
    /// Info level - general application information
    Info = 2,
    /// Warning level - potentially harmful situations
    Warn = 3,
    /// Error level - error events but application can continue
    Error = 4,
    /// Fatal level - severe error events that cause application termination
    Fatal = 5,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// Get ANSI color code for console output
    pub fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[37m",
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[35m",
        }
    }

    /// Reset ANSI color code
    pub fn reset_code() -> &'static str {
        "\x1b[0m"
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Destination for rendered lines.
///
/// Status output and diagnostic logs both go through a sink; the level lets
/// console sinks split stdout from stderr.
pub trait LineSink: Send + Sync {
    fn write_line(&self, level: LogLevel, line: &str);
}

/// Warnings and errors to stderr, everything else to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl LineSink for ConsoleSink {
    fn write_line(&self, level: LogLevel, line: &str) {
        if level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", line);
        } else {
            let mut stdout = io::stdout();
            let _ = writeln!(stdout, "{}", line);
            let _ = stdout.flush();
        }
    }
}

/// Buffers lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }
}

impl LineSink for MemorySink {
    fn write_line(&self, level: LogLevel, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, line.to_string()));
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp when log entry was created
    pub timestamp: DateTime<Utc>,
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    /// Additional structured fields
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
    /// Compact single-line format
    Compact,
}

/// Shared logging context for correlation and session tracking
#[derive(Debug, Default)]
struct LogContext {
    session_id: Option<String>,
    context_fields: BTreeMap<String, serde_json::Value>,
}

/// Logger implementation with multiple output formats
#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    format: LogFormat,
    name: String,
    sink: Arc<dyn LineSink>,
    context: Arc<RwLock<LogContext>>,
}

impl Logger {
    /// Create a new console logger
    pub fn new(name: String) -> Self {
        Self::with_sink(name, Arc::new(ConsoleSink::new()))
    }

    /// Create a logger writing to the given sink
    pub fn with_sink(name: String, sink: Arc<dyn LineSink>) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: false,
            format: LogFormat::Console,
            name,
            sink,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Create a logger with specific configuration
    pub fn with_config(name: String, config: &Config, sink: Arc<dyn LineSink>) -> Self {
        Self {
            min_level: config.effective_log_level(),
            use_color: config.enable_color,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name,
            sink,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// A logger sharing sink, level and context under another component name
    pub fn named(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Set minimum log level
    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Set output format
    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    /// Enable or disable colored output
    pub fn set_color(&mut self, use_color: bool) {
        self.use_color = use_color;
    }

    /// Set session correlation ID
    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Add context field for all subsequent log entries
    pub async fn add_context_field<T: Serialize>(&self, key: String, value: T) {
        if let Ok(json_value) = serde_json::to_value(value) {
            let mut context = self.context.write().await;
            context.context_fields.insert(key, json_value);
        }
    }

    /// Fresh correlation id for a group of related entries
    pub fn new_correlation_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn trace(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder {
        self.log(LogLevel::Error, message)
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Write log entry to the sink
    async fn write_entry(&self, mut entry: LogEntry) {
        if !self.would_log(entry.level) {
            return;
        }

        let context = self.context.read().await;
        if let Some(session_id) = &context.session_id {
            entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }
        for (key, value) in &context.context_fields {
            entry.fields.insert(key.clone(), value.clone());
        }
        drop(context);

        let output = match self.format {
            LogFormat::Console => self.format_console(&entry),
            LogFormat::Json => self.format_json(&entry),
            LogFormat::Compact => self.format_compact(&entry),
        };
        self.sink.write_line(entry.level, &output);
    }

    /// Format log entry for console output
    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level_str = entry.level.as_str();

        let formatted_level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), level_str, LogLevel::reset_code())
        } else {
            format!("{:>5}", level_str)
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            output.push_str(&format!(" [{}]", correlation_id.get(..8).unwrap_or(correlation_id)));
        }

        if !entry.fields.is_empty() {
            let fields_str: Vec<String> = entry.fields.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            output.push_str(&format!(" {{{}}}", fields_str.join(", ")));
        }

        output
    }

    /// Format log entry as JSON
    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": \"{}\"}}", entry.message),
        }
    }

    /// Format log entry in compact format
    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!("{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: BTreeMap::new(),
            },
        }
    }

    /// Add a correlation ID
    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if !self.logger.would_log(self.entry.level) {
            return self;
        }
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    /// Add span timings of a measurement, in milliseconds
    pub fn timing(mut self, measurement: &Measurement) -> Self {
        for kind in SpanKind::ALL {
            let ms = measurement.measures.get(kind).as_millis_f64();
            if !ms.is_nan() {
                self = self.field(&format!("{}_ms", kind.as_str().replace('+', "_")), ms);
            }
        }
        self.field("status_code", measurement.status_code)
            .field("success", measurement.is_success())
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
    }

    /// Emit the entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Logger for probe network events
#[derive(Clone)]
pub struct ProbeLogger {
    logger: Logger,
}

impl ProbeLogger {
    pub fn new(logger: &Logger) -> Self {
        Self { logger: logger.named("NET") }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Log a finished resolution
    pub async fn log_resolution(&self, host: &str, strategy: &str, result: &Result<std::net::IpAddr>) {
        match result {
            Ok(addr) => {
                self.logger.debug(&format!("Resolved {} to {}", host, addr))
                    .field("host", host)
                    .field("strategy", strategy)
                    .field("address", addr.to_string())
                    .log()
                    .await;
            }
            Err(error) => {
                self.logger.warn(&format!("Resolution of {} failed: {}", host, error))
                    .field("host", host)
                    .field("strategy", strategy)
                    .error_info(error)
                    .log()
                    .await;
            }
        }
    }

    /// Log a new connection
    pub async fn log_connection(&self, target: &str, proto: &str, reused: bool) {
        self.logger.debug(&format!("{} connection to {}", if reused { "Reusing" } else { "Opened" }, target))
            .field("target", target)
            .field("proto", proto)
            .field("reused", reused)
            .log()
            .await;
    }

    /// Log a protocol upgrade triggered by Alt-Svc
    pub async fn log_upgrade(&self, from: &str, target: &str) {
        self.logger.info(&format!("Server advertised HTTP/3 at {}, upgrading from {}", target, from))
            .field("from", from)
            .field("target", target)
            .log()
            .await;
    }

    /// Log a request that failed on the upgraded HTTP/3 transport
    pub async fn log_upgrade_failure(&self, target: &str, error: &AppError) {
        self.logger.warn(&format!("HTTP/3 request to {} failed: {}", target, error))
            .field("target", target)
            .error_info(error)
            .log()
            .await;
    }

    /// Log a followed redirect
    pub async fn log_redirect(&self, from: &str, to: &str) {
        self.logger.info(&format!("Redirected from {} to {}", from, to))
            .field("from", from)
            .field("to", to)
            .log()
            .await;
    }

    /// Log the outcome of one probe
    pub async fn log_measurement(&self, url: &str, measurement: &Measurement) {
        let level = if measurement.is_success() { LogLevel::Debug } else { LogLevel::Warn };
        let message = if measurement.is_success() {
            format!("{} {} -> {}", measurement.proto, url, measurement.status_code)
        } else {
            format!("{} -> {}", url, measurement.failure_cause)
        };
        self.logger.log(level, &message)
            .field("url", url)
            .field("reused", measurement.socket_reused)
            .field("in_bytes", measurement.in_bytes)
            .field("out_bytes", measurement.out_bytes)
            .timing(measurement)
            .log()
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }

    #[tokio::test]
    async fn test_entries_reach_sink() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::with_sink("TEST".to_string(), sink.clone());
        logger.info("hello").field("answer", 42).log().await;
        logger.debug("filtered").log().await;

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[TEST] hello"));
        assert!(lines[0].contains("answer=42"));
    }

    #[tokio::test]
    async fn test_json_format_and_context() {
        let sink = Arc::new(MemorySink::new());
        let mut logger = Logger::with_sink("JSON".to_string(), sink.clone());
        logger.set_format(LogFormat::Json);
        logger.set_session_id("session-1".to_string()).await;
        logger.add_context_field("worker".to_string(), 3).await;
        logger.warn("slow").correlation_id("abcdef0123").log().await;

        let entry: LogEntry = serde_json::from_str(&sink.lines()[0]).unwrap();
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.fields["session_id"], "session-1");
        assert_eq!(entry.fields["worker"], 3);
        assert_eq!(entry.correlation_id.as_deref(), Some("abcdef0123"));
    }

    #[tokio::test]
    async fn test_with_config_levels() {
        let sink: Arc<dyn LineSink> = Arc::new(MemorySink::new());
        let config = Config { debug: true, enable_color: false, ..Default::default() };
        let logger = Logger::with_config("CFG".to_string(), &config, sink);
        assert!(logger.would_log(LogLevel::Debug));
        assert!(!logger.would_log(LogLevel::Trace));
        assert_eq!(logger.format, LogFormat::Json);
    }

    #[tokio::test]
    async fn test_probe_logger_measurement() {
        let sink = Arc::new(MemorySink::new());
        let mut logger = Logger::with_sink("TEST".to_string(), sink.clone());
        logger.set_level(LogLevel::Debug);
        let probe_logger = ProbeLogger::new(&logger);

        let measurement = Measurement::failure("Server-side error", Default::default());
        probe_logger.log_measurement("https://example.com", &measurement).await;

        let contents = sink.contents();
        assert!(contents.contains("[NET]"));
        assert!(contents.contains("Server-side error"));
    }
}
