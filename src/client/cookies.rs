//! Cookie jar with the keep/reset policy of a probing client

use crate::types::NameValue;
use http::header::{HeaderMap, HeaderValue, SET_COOKIE};
use std::collections::BTreeMap;

/// Cookies sent with every probe
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    configured: Vec<NameValue>,
    keep_received: bool,
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    /// `keep_received` resends cookies set by the server; otherwise each probe starts from `configured`
    pub fn new(configured: Vec<NameValue>, keep_received: bool) -> Self {
        let mut jar = Self { configured, keep_received, cookies: BTreeMap::new() };
        jar.reset();
        jar
    }

    pub fn reset(&mut self) {
        self.cookies = self
            .configured
            .iter()
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect();
    }

    /// Called before each probe; cookies received during the last one survive only when kept
    pub fn begin_probe(&mut self) {
        if !self.keep_received {
            self.reset();
        }
    }

    /// Absorb `Set-Cookie` headers for the rest of the probe
    pub fn absorb(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let pair = value.split(';').next().unwrap_or_default();
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    self.cookies.insert(name.to_string(), value.trim().to_string());
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// `Cookie` header value, `None` when the jar is empty
    pub fn header_value(&self) -> Option<HeaderValue> {
        if self.cookies.is_empty() {
            return None;
        }
        let joined = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&joined).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_cookie(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for v in values {
            headers.append(SET_COOKIE, HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    #[test]
    fn test_configured_cookies() {
        let jar = CookieJar::new(vec![NameValue::new("a", "1"), NameValue::new("b", "2")], false);
        assert_eq!(jar.header_value().unwrap(), "a=1; b=2");
        assert!(CookieJar::new(Vec::new(), false).header_value().is_none());
    }

    #[test]
    fn test_keep_received() {
        let mut jar = CookieJar::new(vec![NameValue::new("a", "1")], true);
        jar.absorb(&set_cookie(&["session=xyz; Path=/; HttpOnly", "a=9"]));
        jar.begin_probe();
        assert_eq!(jar.header_value().unwrap(), "a=9; session=xyz");
    }

    #[test]
    fn test_received_cookies_apply_within_probe() {
        let mut jar = CookieJar::new(Vec::new(), false);
        jar.begin_probe();
        jar.absorb(&set_cookie(&["sid=42; Path=/"]));
        assert_eq!(jar.header_value().unwrap(), "sid=42");

        jar.begin_probe();
        assert!(jar.header_value().is_none());
    }

    #[test]
    fn test_reset_policy_drops_received() {
        let mut jar = CookieJar::new(vec![NameValue::new("a", "1")], false);
        jar.absorb(&set_cookie(&["session=xyz"]));
        jar.begin_probe();
        assert_eq!(jar.header_value().unwrap(), "a=1");
    }
}
