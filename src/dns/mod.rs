//! Hostname resolution for the dial paths
//!
//! A [`Resolver`] owns its strategy and cache. Literal addresses are accepted
//! without I/O whatever the strategy, as long as they match a forced IP family.

pub mod doh;
pub mod recursive;
pub mod upstream;

pub use doh::DohLookup;
pub use recursive::RecursiveLookup;
pub use upstream::{DnsUpstream, ServerLookup, UdpUpstream};

use crate::{
    error::{AppError, Result},
    logging::{Logger, ProbeLogger},
    models::Config,
    types::{DnsStrategy, IpProtocol},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use trust_dns_resolver::proto::rr::RecordType;

/// Per-family address lookup
#[async_trait]
pub trait AddressLookup: Send + Sync {
    /// Addresses of `record_type` for `host`; empty when the name exists without such records
    async fn lookup(&self, host: &str, record_type: RecordType) -> Result<Vec<IpAddr>>;
}

enum Backend {
    System,
    Lookup(Arc<dyn AddressLookup>),
}

/// Hostname resolver with an optional per-instance cache
pub struct Resolver {
    backend: Backend,
    strategy_name: String,
    ip_protocol: IpProtocol,
    cache_enabled: bool,
    cache: Mutex<HashMap<String, IpAddr>>,
    logger: Option<ProbeLogger>,
}

impl Resolver {
    /// Build the resolver selected by the configuration
    pub fn new(config: &Config, logger: &Logger) -> Result<Self> {
        config.dns.validate()?;
        let backend = match &config.dns {
            DnsStrategy::System => Backend::System,
            DnsStrategy::FullRecursive => {
                Backend::Lookup(Arc::new(RecursiveLookup::new(Arc::new(UdpUpstream::default()))))
            }
            DnsStrategy::Server(server) => Backend::Lookup(Arc::new(ServerLookup::new(
                DnsStrategy::parse_server(server)?,
                Arc::new(UdpUpstream::default()),
            ))),
            DnsStrategy::DoH(url) => {
                Backend::Lookup(Arc::new(DohLookup::new(url.clone(), crate::defaults::DNS_QUERY_TIMEOUT)?))
            }
        };

        Ok(Self {
            backend,
            strategy_name: config.dns.name(),
            ip_protocol: config.ip_protocol,
            cache_enabled: config.cache_dns,
            cache: Mutex::new(HashMap::new()),
            logger: Some(ProbeLogger::new(logger)),
        })
    }

    /// Platform resolver without cache
    pub fn system(ip_protocol: IpProtocol) -> Self {
        Self {
            backend: Backend::System,
            strategy_name: DnsStrategy::System.name(),
            ip_protocol,
            cache_enabled: false,
            cache: Mutex::new(HashMap::new()),
            logger: None,
        }
    }

    /// Resolver over a custom lookup
    pub fn with_lookup(lookup: Arc<dyn AddressLookup>, ip_protocol: IpProtocol, cache_enabled: bool) -> Self {
        Self {
            backend: Backend::Lookup(lookup),
            strategy_name: "custom".to_string(),
            ip_protocol,
            cache_enabled,
            cache: Mutex::new(HashMap::new()),
            logger: None,
        }
    }

    pub fn ip_protocol(&self) -> IpProtocol {
        self.ip_protocol
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    /// Resolve `host` to one address of the configured family
    pub async fn resolve(&self, host: &str) -> Result<IpAddr> {
        let host = host.trim_start_matches('[').trim_end_matches(']');

        if let Ok(ip) = host.parse::<IpAddr>() {
            if !self.ip_protocol.accepts(&ip) {
                return Err(AppError::dns_resolution(format!("lookup {}: no suitable address found", host)));
            }
            return Ok(ip);
        }
        if let Some(ip) = self.cached(host) {
            return Ok(ip);
        }

        let result = self.resolve_uncached(host).await;
        if let Some(logger) = &self.logger {
            logger.log_resolution(host, &self.strategy_name, &result).await;
        }

        let ip = result?;
        if self.cache_enabled {
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(host.to_string(), ip);
            }
        }
        Ok(ip)
    }

    /// Resolve a `host:port` pair into a dialable socket address
    pub async fn resolve_conn_addr(&self, host_port: &str) -> Result<SocketAddr> {
        let (host, port) = split_host_port(host_port)?;
        Ok(SocketAddr::new(self.resolve(host).await?, port))
    }

    /// Resolve `host:port` into `ip:port`, IPv6 addresses bracketed
    pub async fn resolve_conn_target(&self, host_port: &str) -> Result<String> {
        Ok(self.resolve_conn_addr(host_port).await?.to_string())
    }

    fn cached(&self, host: &str) -> Option<IpAddr> {
        if !self.cache_enabled {
            return None;
        }
        self.cache.lock().ok().and_then(|cache| cache.get(host).copied())
    }

    async fn resolve_uncached(&self, host: &str) -> Result<IpAddr> {
        let addrs = match &self.backend {
            Backend::System => tokio::net::lookup_host((host, 0))
                .await
                .map_err(|e| AppError::dns_resolution(format!("lookup {}: {}", host, e)))?
                .map(|addr| addr.ip())
                .collect(),
            Backend::Lookup(lookup) => match self.ip_protocol {
                IpProtocol::V4 => lookup.lookup(host, RecordType::A).await?,
                IpProtocol::V6 => lookup.lookup(host, RecordType::AAAA).await?,
                IpProtocol::Any => race_dual_stack(lookup.as_ref(), host).await?,
            },
        };

        addrs
            .into_iter()
            .find(|addr| self.ip_protocol.accepts(addr))
            .ok_or_else(|| upstream::no_such_host(host))
    }
}

/// Query A and AAAA concurrently; a non-empty AAAA answer wins
async fn race_dual_stack(lookup: &dyn AddressLookup, host: &str) -> Result<Vec<IpAddr>> {
    let v4 = lookup.lookup(host, RecordType::A);
    let v6 = lookup.lookup(host, RecordType::AAAA);
    tokio::pin!(v4, v6);

    tokio::select! {
        v6_result = &mut v6 => match v6_result {
            Ok(addrs) if !addrs.is_empty() => Ok(addrs),
            _ => v4.await,
        },
        v4_result = &mut v4 => match v6.await {
            Ok(addrs) if !addrs.is_empty() => Ok(addrs),
            _ => v4_result,
        },
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts
pub fn split_host_port(host_port: &str) -> Result<(&str, u16)> {
    let invalid = || AppError::parse(format!("Invalid host:port '{}'", host_port));

    let (host, port) = if let Some(rest) = host_port.strip_prefix('[') {
        let (host, rest) = rest.split_once(']').ok_or_else(invalid)?;
        (host, rest.strip_prefix(':').ok_or_else(invalid)?)
    } else {
        host_port.rsplit_once(':').ok_or_else(invalid)?
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host, port))
}
