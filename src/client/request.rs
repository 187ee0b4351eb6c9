//! Per-probe request construction

use super::cookies::CookieJar;
use crate::error::{AppError, Result};
use crate::models::Config;
use crate::types::NameValue;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{HeaderName, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION, COOKIE, HOST, REFERER, USER_AGENT};
use http::{Method, Request};
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// Query parameter appended when cache busting is enabled
pub const EXTRA_PARAMETER: &str = "extra_parameter_http_ping";

/// Everything about a probe request that does not change between probes
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    headers: Vec<(HeaderName, HeaderValue)>,
    parameters: Vec<NameValue>,
    extra_param: bool,
}

impl RequestTemplate {
    pub fn from_config(config: &Config) -> Result<Self> {
        let method = Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| AppError::validation(format!("Invalid HTTP method: {}", config.method)))?;

        let mut headers = Vec::new();
        headers.push((USER_AGENT, header_value(&config.user_agent)?));

        if let Some(referrer) = config.referrer.as_deref().filter(|r| !r.is_empty()) {
            headers.push((REFERER, header_value(referrer)?));
        }

        if config.auth_username.is_some() || config.auth_password.is_some() {
            let credentials = format!(
                "{}:{}",
                config.auth_username.as_deref().unwrap_or_default(),
                config.auth_password.as_deref().unwrap_or_default()
            );
            headers.push((AUTHORIZATION, header_value(&format!("Basic {}", STANDARD.encode(credentials)))?));
        }

        if !config.disable_compression && method != Method::HEAD {
            headers.push((ACCEPT_ENCODING, HeaderValue::from_static("gzip")));
        }

        // custom headers replace defaults of the same name
        for header in &config.headers {
            let name = HeaderName::from_bytes(header.name.trim().as_bytes())
                .map_err(|_| AppError::validation(format!("Invalid header name: {}", header.name)))?;
            headers.retain(|(existing, _)| *existing != name);
            headers.push((name, header_value(&header.value)?));
        }

        Ok(Self {
            method,
            headers,
            parameters: config.parameters.clone(),
            extra_param: config.extra_param,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// `Host` header override, if configured
    pub fn host_override(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| *name == HOST)
            .and_then(|(_, value)| value.to_str().ok())
    }

    /// `url` with the configured and cache-busting query parameters appended
    pub fn prepare_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        if self.extra_param || !self.parameters.is_empty() {
            let mut query = url.query_pairs_mut();
            if self.extra_param {
                let micros = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_micros())
                    .unwrap_or_default();
                query.append_pair(EXTRA_PARAMETER, &micros.to_string());
            }
            for parameter in &self.parameters {
                query.append_pair(&parameter.name, &parameter.value);
            }
        }
        url
    }

    /// Build the request for `url`, an absolute http(s) URL
    pub fn build(&self, url: &Url, cookies: &CookieJar) -> Result<Request<()>> {
        let url = self.prepare_url(url);
        let mut builder = Request::builder().method(self.method.clone()).uri(url.as_str());

        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        if let Some(cookie) = cookies.header_value() {
            builder = builder.header(COOKIE, cookie);
        }

        Ok(builder.body(())?)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| AppError::validation(format!("Invalid header value: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::for_target("https://example.com/path")
    }

    #[test]
    fn test_default_headers() {
        let template = RequestTemplate::from_config(&config()).unwrap();
        let url = Url::parse("https://example.com/path").unwrap();
        let request = template.build(&url, &CookieJar::default()).unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.uri().to_string(), "https://example.com/path");
        assert!(request.headers()[USER_AGENT].to_str().unwrap().starts_with("http-ping/"));
        assert_eq!(request.headers()[ACCEPT_ENCODING], "gzip");
        assert!(!request.headers().contains_key(COOKIE));
    }

    #[test]
    fn test_head_and_disabled_compression_skip_gzip() {
        let mut head = config();
        head.method = "head".to_string();
        let template = RequestTemplate::from_config(&head).unwrap();
        assert_eq!(template.method(), Method::HEAD);
        let request = template.build(&Url::parse("https://example.com").unwrap(), &CookieJar::default()).unwrap();
        assert!(!request.headers().contains_key(ACCEPT_ENCODING));

        let mut plain = config();
        plain.disable_compression = true;
        let request = RequestTemplate::from_config(&plain)
            .unwrap()
            .build(&Url::parse("https://example.com").unwrap(), &CookieJar::default())
            .unwrap();
        assert!(!request.headers().contains_key(ACCEPT_ENCODING));
    }

    #[test]
    fn test_basic_auth_and_referrer() {
        let mut config = config();
        config.auth_username = Some("user".to_string());
        config.auth_password = Some("pass".to_string());
        config.referrer = Some("https://referrer.test/".to_string());
        let request = RequestTemplate::from_config(&config)
            .unwrap()
            .build(&Url::parse("https://example.com").unwrap(), &CookieJar::default())
            .unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Basic dXNlcjpwYXNz");
        assert_eq!(request.headers()[REFERER], "https://referrer.test/");
    }

    #[test]
    fn test_custom_headers_override_defaults() {
        let mut config = config();
        config.headers = vec![NameValue::new("User-Agent", "custom"), NameValue::new("Host", "origin.test")];
        let template = RequestTemplate::from_config(&config).unwrap();
        assert_eq!(template.host_override(), Some("origin.test"));
        let request = template.build(&Url::parse("https://example.com").unwrap(), &CookieJar::default()).unwrap();
        assert_eq!(request.headers().get_all(USER_AGENT).iter().count(), 1);
        assert_eq!(request.headers()[USER_AGENT], "custom");
    }

    #[test]
    fn test_parameters_and_cache_busting() {
        let mut config = config();
        config.parameters = vec![NameValue::new("a", "1 2")];
        config.extra_param = true;
        let template = RequestTemplate::from_config(&config).unwrap();
        let url = template.prepare_url(&Url::parse("https://example.com/?x=y").unwrap());

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("x".to_string(), "y".to_string()));
        assert_eq!(pairs[1].0, EXTRA_PARAMETER);
        assert!(pairs[1].1.parse::<u128>().unwrap() > 0);
        assert_eq!(pairs[2], ("a".to_string(), "1 2".to_string()));
    }

    #[test]
    fn test_cookies_are_sent() {
        let jar = CookieJar::new(vec![NameValue::new("session", "abc")], false);
        let request = RequestTemplate::from_config(&config())
            .unwrap()
            .build(&Url::parse("https://example.com").unwrap(), &jar)
            .unwrap();
        assert_eq!(request.headers()[COOKIE], "session=abc");
    }

    #[test]
    fn test_invalid_method() {
        let mut config = config();
        config.method = "BAD METHOD".to_string();
        assert!(RequestTemplate::from_config(&config).is_err());
    }
}
