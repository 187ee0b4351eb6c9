//! `Alt-Svc` header parsing and the HTTP/3 upgrade decision

use crate::types::HttpVersion;
use regex::Regex;
use std::sync::OnceLock;

fn field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*([a-zA-Z0-9-]+)=(.*)$").expect("valid Alt-Svc field pattern"))
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Value of the `h3` token of an `Alt-Svc` header, if advertised.
///
/// Fields are `token=value` separated by `;` (and `,` between alternatives).
/// Quoted values are unquoted.
pub fn parse_h3(header: &str) -> Option<String> {
    header
        .split([';', ','])
        .filter_map(|field| field_pattern().captures(field))
        .find(|captures| &captures[1] == "h3")
        .map(|captures| unquote(&captures[2]).to_string())
}

/// Resolve an advertised value into a `host:port` authority.
///
/// A value of the form `:port` keeps the current host.
pub fn upgrade_authority(advertised: &str, current_host: &str) -> String {
    if advertised.starts_with(':') {
        if current_host.contains(':') && !current_host.starts_with('[') {
            format!("[{}]{}", current_host, advertised)
        } else {
            format!("{}{}", current_host, advertised)
        }
    } else {
        advertised.to_string()
    }
}

/// Progress of the Alt-Svc upgrade within one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    /// First attempt on the configured transport
    Probing,
    /// Transport rebuilt for HTTP/3, re-executing once
    Upgrading,
    /// No further upgrade allowed
    Done,
}

impl UpgradeState {
    /// Whether an advertisement seen in this state may trigger an upgrade
    pub fn may_upgrade(&self, configured: HttpVersion, current_proto: &str) -> bool {
        *self == UpgradeState::Probing
            && !matches!(configured, HttpVersion::Http1 | HttpVersion::Http2 | HttpVersion::Http3)
            && current_proto != "HTTP/3.0"
    }

    pub fn next(&self) -> UpgradeState {
        match self {
            UpgradeState::Probing => UpgradeState::Upgrading,
            UpgradeState::Upgrading | UpgradeState::Done => UpgradeState::Done,
        }
    }
}
