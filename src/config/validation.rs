//! Configuration validation utilities and rules

use crate::{
    error::Result,
    models::Config,
    types::HttpVersion,
};
use colored::Colorize;
use std::time::Duration;

/// Worker count above which disabling keep-alive gets flagged
const MANY_WORKERS: usize = 32;

/// Configuration validator with advisory checks beyond `Config::validate`
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration and collect advisory warnings
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_target(config)?);
        warnings.extend(Self::validate_connection_settings(config));
        warnings.extend(Self::validate_pacing(config));

        Ok(warnings)
    }

    fn validate_target(config: &Config) -> Result<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();
        let url = config.target_url()?;

        if url.scheme() == "http" && config.insecure {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("--insecure has no effect on plain HTTP target '{}'", config.target),
            ));
        }

        if url.scheme() == "http" && config.http_version == HttpVersion::Http2 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "HTTP/2 over plain HTTP requires prior-knowledge support on the server".to_string(),
            ));
        }

        if let Some(port) = url.port() {
            if (url.scheme() == "https" && port == 80) || (url.scheme() == "http" && port == 443) {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("Target '{}' uses scheme {} on port {}", config.target, url.scheme(), port),
                ));
            }
        }

        Ok(warnings)
    }

    fn validate_connection_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.http_version == HttpVersion::Http3 && config.conn_target.is_some() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Connection target applies to the QUIC endpoint as well".to_string(),
            ));
        }

        if config.cache_dns && config.conn_target.is_some() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "--cache-dns only affects the connection target name".to_string(),
            ));
        }

        if config.workers > MANY_WORKERS && config.disable_keep_alive {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "{} workers without keep-alive open a new connection per request and may exhaust local ports",
                    config.workers
                ),
            ));
        }

        warnings
    }

    fn validate_pacing(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.interval.is_zero() && config.count == u64::MAX {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Zero interval with unbounded count sends requests as fast as possible until interrupted".to_string(),
            ));
        }

        if config.wait < Duration::from_millis(100) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Wait of {:?} is likely shorter than a single round trip", config.wait),
            ));
        }

        if config.throughput && config.throughput_refresh < Duration::from_millis(100) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Throughput refresh of {:?} produces very noisy samples", config.throughput_refresh),
            ));
        }

        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    /// Get display string for level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        if !use_color {
            return format!("{} {}", tag, self.message);
        }
        let tag = match self.level {
            ValidationLevel::Info => tag.blue(),
            ValidationLevel::Warning => tag.yellow(),
            ValidationLevel::Error => tag.red(),
        };
        format!("{} {}", tag, self.message)
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
