//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::Result,
    models::{normalize_target, Config},
    types::{DnsStrategy, HttpVersion, IpProtocol, Verbosity},
};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file()?;
        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config);

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(target) = &cli.target {
            config.target = normalize_target(target.trim());
        }
        if let Some(count) = cli.count {
            config.count = count;
        }
        if let Some(interval) = cli.interval {
            config.interval = interval;
        }
        if let Some(wait) = cli.wait {
            config.wait = wait;
        }
        if let Some(method) = &cli.method {
            config.method = method.to_uppercase();
        }
        if let Some(user_agent) = &cli.user_agent {
            config.user_agent = user_agent.clone();
        }

        config.disable_keep_alive |= cli.disable_keepalive;
        config.insecure |= cli.insecure;
        config.disable_compression |= cli.disable_compression;
        config.ignore_server_errors |= cli.ignore_server_errors;
        config.extra_param |= cli.extra_parameter;
        config.cache_dns |= cli.cache_dns;
        config.keep_cookies |= cli.keep_cookies;
        config.follow_redirects |= cli.follow_redirects;
        config.throughput |= cli.throughput;
        config.audible_bell |= cli.audible_bell;
        config.debug |= cli.debug;

        config.cookies.extend(cli.cookies.iter().cloned());
        config.headers.extend(cli.headers.iter().cloned());
        config.parameters.extend(cli.parameters.iter().cloned());

        if cli.referrer.is_some() {
            config.referrer = cli.referrer.clone();
        }
        if cli.user.is_some() {
            config.auth_username = cli.user.clone();
            config.auth_password = cli.password.clone();
        }

        if cli.http1 {
            config.http_version = HttpVersion::Http1;
        } else if cli.http2 {
            config.http_version = HttpVersion::Http2;
        } else if cli.http3 {
            config.http_version = HttpVersion::Http3;
        }

        if cli.ipv4 {
            config.ip_protocol = IpProtocol::V4;
        } else if cli.ipv6 {
            config.ip_protocol = IpProtocol::V6;
        }

        if cli.conn_target.is_some() {
            config.conn_target = cli.conn_target.clone();
        }

        if cli.full_dns {
            config.dns = DnsStrategy::FullRecursive;
        } else if let Some(server) = &cli.dns_server {
            config.dns = DnsStrategy::Server(server.clone());
        } else if let Some(url) = &cli.doh_url {
            config.dns = DnsStrategy::DoH(url.clone());
        }

        if let Some(workers) = cli.workers {
            config.workers = workers;
        }
        if let Some(refresh) = cli.throughput_refresh {
            config.throughput_refresh = refresh;
        }

        if cli.quiet {
            config.verbosity = Verbosity::Quiet;
        } else if cli.verbose {
            config.verbosity = Verbosity::Verbose;
        }
        if cli.log_level.is_some() {
            config.log_level = cli.log_level.clone();
        }
        if !cli.use_colors() {
            config.enable_color = false;
        }
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Configuration summary for debug output
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Target: {} {}", config.method, config.target));
    summary.push(format!("HTTP version: {}", config.http_version.label()));
    summary.push(format!("IP protocol: {:?}", config.ip_protocol));
    summary.push(format!("DNS: {}{}", config.dns.name(), if config.cache_dns { " (cached)" } else { "" }));
    if let Some(conn_target) = &config.conn_target {
        summary.push(format!("Connection target: {}", conn_target));
    }
    if config.count == u64::MAX {
        summary.push("Count: unbounded".to_string());
    } else {
        summary.push(format!("Count: {}", config.count));
    }
    summary.push(format!("Interval: {:?}", config.interval));
    summary.push(format!("Wait: {:?}", config.wait));
    summary.push(format!("Workers: {}", config.workers));
    summary.push(format!("Keep-alive: {}", config.keep_alive()));
    summary.push(format!("Follow redirects: {}", config.follow_redirects));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbosity: {:?}", config.verbosity));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NameValue;
    use clap::Parser;
    use std::env;
    use std::sync::Mutex;
    use std::time::Duration;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for (name, _, _) in EnvManager::get_supported_env_vars() {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_cli_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let cli = Cli::parse_from([
            "http-ping", "example.com/health",
            "-c", "10",
            "--wait", "5s",
            "--method", "head",
            "-K",
            "-H", "X-Trace: on",
            "--http1",
            "-4",
            "--dns-server", "9.9.9.9",
            "--workers", "2",
            "--no-color",
            "--verbose",
        ]);
        let config = ConfigParser::new(cli).parse().unwrap();

        assert_eq!(config.target, "https://example.com/health");
        assert_eq!(config.count, 10);
        assert_eq!(config.wait, Duration::from_secs(5));
        assert_eq!(config.method, "HEAD");
        assert!(!config.keep_alive());
        assert_eq!(config.headers, vec![NameValue::new("X-Trace", "on")]);
        assert_eq!(config.http_version, HttpVersion::Http1);
        assert_eq!(config.ip_protocol, IpProtocol::V4);
        assert_eq!(config.dns, DnsStrategy::Server("9.9.9.9".into()));
        assert_eq!(config.workers, 2);
        assert!(!config.enable_color);
        assert!(config.verbose());
    }

    #[test]
    fn test_cli_overrides_env_vars() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        env::set_var("HTTP_PING_COUNT", "8");
        env::set_var("HTTP_PING_WORKERS", "3");
        let cli = Cli::parse_from(["http-ping", "example.com", "--count", "12"]);
        let config = ConfigParser::new(cli).parse();
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.count, 12);
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn test_invalid_env_is_reported() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        env::set_var("HTTP_PING_INTERVAL", "often");
        let result = load_config(Cli::parse_from(["http-ping", "example.com"]));
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_target() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let result = load_config(Cli::parse_from(["http-ping", "ftp://example.com"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_summary() {
        let mut config = Config::for_target("example.com");
        config.conn_target = Some("127.0.0.1:443".into());
        let summary = display_config_summary(&config);

        assert!(summary.contains("Target: GET https://example.com"));
        assert!(summary.contains("Count: unbounded"));
        assert!(summary.contains("Connection target: 127.0.0.1:443"));
        assert!(summary.contains("DNS: system"));
    }
}
