//! DNS-over-HTTPS lookups through the JSON API

use super::upstream::no_such_host;
use super::AddressLookup;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use trust_dns_resolver::proto::rr::RecordType;

/// `Status` value of an NXDOMAIN answer
const NXDOMAIN: u64 = 3;

/// DNS-over-HTTPS client
#[derive(Clone)]
pub struct DohLookup {
    url: String,
    client: Client,
}

impl DohLookup {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::PKG_NAME, crate::VERSION))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create DoH client: {}", e)))?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: String, client: Client) -> Self {
        Self { url, client }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Extract addresses of `record_type` from a JSON answer
    fn parse_dns_response(&self, host: &str, response: serde_json::Value, record_type: RecordType) -> Result<Vec<IpAddr>> {
        if response.get("Status").and_then(|s| s.as_u64()) == Some(NXDOMAIN) {
            return Err(no_such_host(host));
        }

        let wanted = u64::from(u16::from(record_type));
        let mut ips = Vec::new();

        if let Some(answers) = response.get("Answer").and_then(|a| a.as_array()) {
            for answer in answers {
                // CNAME entries share the array with the addresses
                if answer.get("type").and_then(|t| t.as_u64()) != Some(wanted) {
                    continue;
                }
                if let Some(data) = answer.get("data").and_then(|d| d.as_str()) {
                    match record_type {
                        RecordType::A => {
                            if let Ok(ipv4) = data.parse::<Ipv4Addr>() {
                                ips.push(IpAddr::V4(ipv4));
                            }
                        }
                        RecordType::AAAA => {
                            if let Ok(ipv6) = data.parse::<Ipv6Addr>() {
                                ips.push(IpAddr::V6(ipv6));
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(ips)
    }
}

#[async_trait]
impl AddressLookup for DohLookup {
    async fn lookup(&self, host: &str, record_type: RecordType) -> Result<Vec<IpAddr>> {
        let type_name = match record_type {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            other => {
                return Err(AppError::dns_resolution(format!("Unsupported DoH record type {}", other)))
            }
        };

        let response = self
            .client
            .get(&self.url)
            .query(&[("name", host), ("type", type_name)])
            .header("Accept", "application/dns-json")
            .send()
            .await
            .map_err(|e| AppError::dns_resolution(format!("DoH request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::dns_resolution(format!(
                "DoH query failed with status: {}",
                response.status()
            )));
        }

        let dns_response: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::parse(format!("Failed to parse DoH response: {}", e)))?;

        self.parse_dns_response(host, dns_response, record_type)
    }
}
