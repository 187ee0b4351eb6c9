//! Error handling for the HTTP latency prober

use thiserror::Error;

/// Custom error types for the HTTP latency prober
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parsing errors (URLs, DNS messages, durations, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// DNS resolution errors
    #[error("DNS resolution error: {0}")]
    DnsResolution(String),

    /// Dial and connection-level errors
    #[error("Network error: {0}")]
    Network(String),

    /// TLS or QUIC handshake errors
    #[error("TLS error: {0}")]
    Tls(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The server did not speak the HTTP version that was forced
    #[error("{0}")]
    ProtocolMismatch(String),

    /// Failure while draining a response body
    #[error("{0}")]
    BodyRead(String),

    /// 5xx response that was not ignored
    #[error("{0}")]
    ServerError(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new DNS resolution error
    pub fn dns_resolution<S: Into<String>>(message: S) -> Self {
        Self::DnsResolution(message.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Create a new TLS error
    pub fn tls<S: Into<String>>(message: S) -> Self {
        Self::Tls(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a protocol mismatch error naming the forced version
    pub fn protocol_mismatch<S: AsRef<str>>(forced: S) -> Self {
        Self::ProtocolMismatch(format!("{} not supported by server", forced.as_ref()))
    }

    /// The fixed body-read failure
    pub fn body_read() -> Self {
        Self::BodyRead("I/O error while reading payload".to_string())
    }

    /// The fixed server-side failure
    pub fn server_error() -> Self {
        Self::ServerError("Server-side error".to_string())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Validation(_) => "VALIDATION",
            Self::Parse(_) => "PARSE",
            Self::DnsResolution(_) => "DNS",
            Self::Network(_) => "NETWORK",
            Self::Tls(_) => "TLS",
            Self::Timeout(_) => "TIMEOUT",
            Self::ProtocolMismatch(_) => "PROTOCOL",
            Self::BodyRead(_) => "BODY",
            Self::ServerError(_) => "SERVER",
            Self::Io(_) => "IO",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Probe-time errors are recoverable: the worker moves on to the next probe
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::DnsResolution(_)
            | Self::Network(_)
            | Self::Tls(_)
            | Self::Timeout(_)
            | Self::ProtocolMismatch(_)
            | Self::BodyRead(_)
            | Self::ServerError(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => false,
            Self::Io(_) | Self::Internal(_) => false,
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::DnsResolution(_) | Self::Network(_) | Self::Tls(_) => 2,
            Self::Timeout(_) => 3,
            Self::ProtocolMismatch(_) | Self::BodyRead(_) | Self::ServerError(_) => 4,
            Self::Io(_) => 5,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::DnsResolution(_) | Self::Network(_) | Self::Tls(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::ProtocolMismatch(_) | Self::BodyRead(_) | Self::ServerError(_) => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout(error.to_string()),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => Self::network(error.to_string()),
            _ => Self::io(error.to_string()),
        }
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else {
            Self::dns_resolution(format!("DNS-over-HTTPS exchange failed: {}", error))
        }
    }
}

impl From<trust_dns_resolver::proto::error::ProtoError> for AppError {
    fn from(error: trust_dns_resolver::proto::error::ProtoError) -> Self {
        Self::dns_resolution(error.to_string())
    }
}

impl From<hyper::Error> for AppError {
    fn from(error: hyper::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else {
            Self::network(error.to_string())
        }
    }
}

impl From<http::Error> for AppError {
    fn from(error: http::Error) -> Self {
        Self::parse(format!("Invalid request: {}", error))
    }
}

impl From<rustls::Error> for AppError {
    fn from(error: rustls::Error) -> Self {
        Self::tls(error.to_string())
    }
}

impl From<quinn::ConnectError> for AppError {
    fn from(error: quinn::ConnectError) -> Self {
        Self::network(format!("QUIC connect: {}", error))
    }
}

impl From<quinn::ConnectionError> for AppError {
    fn from(error: quinn::ConnectionError) -> Self {
        match error {
            quinn::ConnectionError::TimedOut => Self::timeout("QUIC handshake timed out"),
            other => Self::network(format!("QUIC connection: {}", other)),
        }
    }
}

impl From<h3::Error> for AppError {
    fn from(error: h3::Error) -> Self {
        Self::network(format!("HTTP/3: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("request deadline exceeded")
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::parse(format!("IP address parse error: {}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error reporter for user-facing console output
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    /// Create a new error reporter
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Render an error, with its category hint when verbose
    pub fn render(&self, error: &AppError) -> String {
        let mut out = error.format_for_console(self.use_color);
        if self.verbose && !error.is_recoverable() {
            out.push_str("\n\nCheck the command line arguments, HTTP_PING_* variables and the .env file.");
        }
        out
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}
