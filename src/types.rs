//! Shared type definitions

use crate::error::{AppError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

/// Address family restriction for resolution and dialing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IpProtocol {
    #[default]
    Any,
    V4,
    V6,
}

impl IpProtocol {
    pub fn accepts(&self, addr: &std::net::IpAddr) -> bool {
        match self {
            IpProtocol::Any => true,
            IpProtocol::V4 => addr.is_ipv4(),
            IpProtocol::V6 => addr.is_ipv6(),
        }
    }
}

/// HTTP version selection; `Auto` negotiates and may upgrade through Alt-Svc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpVersion {
    #[default]
    Auto,
    Http1,
    Http2,
    Http3,
}

impl HttpVersion {
    pub fn is_forced(&self) -> bool {
        !matches!(self, HttpVersion::Auto)
    }

    /// Protocol string reported in measurements, as sent on the status line
    pub fn proto(&self) -> Option<&'static str> {
        match self {
            HttpVersion::Auto => None,
            HttpVersion::Http1 => Some("HTTP/1.1"),
            HttpVersion::Http2 => Some("HTTP/2.0"),
            HttpVersion::Http3 => Some("HTTP/3.0"),
        }
    }

    /// Short name used in mismatch messages
    pub fn label(&self) -> &'static str {
        match self {
            HttpVersion::Auto => "auto",
            HttpVersion::Http1 => "HTTP/1.1",
            HttpVersion::Http2 => "HTTP/2",
            HttpVersion::Http3 => "HTTP/3",
        }
    }
}

/// Where hostnames get resolved
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DnsStrategy {
    /// Platform resolver
    #[default]
    System,
    /// Iterative resolution from the root servers
    FullRecursive,
    /// Direct queries to one server
    Server(String),
    /// DNS-over-HTTPS endpoint
    DoH(String),
}

impl DnsStrategy {
    pub fn name(&self) -> String {
        match self {
            DnsStrategy::System => "system".to_string(),
            DnsStrategy::FullRecursive => "full-recursive".to_string(),
            DnsStrategy::Server(server) => format!("server {}", server),
            DnsStrategy::DoH(url) => format!("doh {}", url),
        }
    }

    /// Parse a DNS server given as `ip`, `ip:port` or `[ipv6]:port`, defaulting to port 53
    pub fn parse_server(server: &str) -> Result<SocketAddr> {
        let server = server.trim();
        if let Ok(addr) = server.parse::<SocketAddr>() {
            return Ok(addr);
        }
        let ip = server
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<std::net::IpAddr>()
            .map_err(|_| AppError::config(format!("Invalid DNS server address: {}", server)))?;
        Ok(SocketAddr::new(ip, 53))
    }

    /// Check construction-time parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            DnsStrategy::System | DnsStrategy::FullRecursive => Ok(()),
            DnsStrategy::Server(server) => Self::parse_server(server).map(|_| ()),
            DnsStrategy::DoH(url) => {
                let parsed = Url::parse(url)
                    .map_err(|e| AppError::config(format!("Invalid DoH URL '{}': {}", url, e)))?;
                if parsed.scheme() != "https" {
                    return Err(AppError::config(format!("DoH URL must use HTTPS: {}", url)));
                }
                Ok(())
            }
        }
    }
}

/// Amount of per-probe output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    Quiet,
    #[default]
    Standard,
    Verbose,
}

/// A `name:value` or `name=value` pair from the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

impl NameValue {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*([^:=\s][^:=]*?)\s*[:=](.*)$").expect("valid pair pattern"))
}

impl FromStr for NameValue {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let captures = pair_pattern()
            .captures(s)
            .ok_or_else(|| AppError::parse(format!("Expected name:value, got '{}'", s)))?;
        Ok(Self {
            name: captures[1].to_string(),
            value: captures[2].trim().to_string(),
        })
    }
}

impl fmt::Display for NameValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_value_parsing() {
        let colon: NameValue = "X-Trace: abc".parse().unwrap();
        assert_eq!(colon, NameValue::new("X-Trace", "abc"));

        let equals: NameValue = "session=42".parse().unwrap();
        assert_eq!(equals, NameValue::new("session", "42"));

        let url_value: NameValue = "next:https://example.com/a?b=c".parse().unwrap();
        assert_eq!(url_value.value, "https://example.com/a?b=c");

        assert!("novalue".parse::<NameValue>().is_err());
        assert!(":empty-name".parse::<NameValue>().is_err());
    }

    #[test]
    fn test_dns_server_parsing() {
        assert_eq!(
            DnsStrategy::parse_server("8.8.8.8").unwrap(),
            "8.8.8.8:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            DnsStrategy::parse_server("9.9.9.9:5353").unwrap(),
            "9.9.9.9:5353".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            DnsStrategy::parse_server("2001:4860:4860::8888").unwrap(),
            "[2001:4860:4860::8888]:53".parse::<SocketAddr>().unwrap()
        );
        assert!(DnsStrategy::parse_server("dns.example").is_err());
    }

    #[test]
    fn test_doh_requires_https() {
        assert!(DnsStrategy::DoH("https://dns.google/dns-query".into()).validate().is_ok());
        assert!(DnsStrategy::DoH("http://dns.google/dns-query".into()).validate().is_err());
    }

    #[test]
    fn test_ip_protocol_filter() {
        let v4: std::net::IpAddr = "1.2.3.4".parse().unwrap();
        let v6: std::net::IpAddr = "::1".parse().unwrap();
        assert!(IpProtocol::Any.accepts(&v4) && IpProtocol::Any.accepts(&v6));
        assert!(IpProtocol::V4.accepts(&v4) && !IpProtocol::V4.accepts(&v6));
        assert!(IpProtocol::V6.accepts(&v6) && !IpProtocol::V6.accepts(&v4));
    }
}
