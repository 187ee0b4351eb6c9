//! Wire-format DNS exchanges and the explicit-server lookup

use super::AddressLookup;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use trust_dns_resolver::proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_resolver::proto::rr::{Name, RData, RecordType};
use uuid::Uuid;

/// Sends one DNS message to a server and returns its answer
#[async_trait]
pub trait DnsUpstream: Send + Sync {
    async fn exchange(&self, server: SocketAddr, request: &Message) -> Result<Message>;
}

/// UDP transport, retrying over TCP when the answer is truncated
#[derive(Debug, Clone)]
pub struct UdpUpstream {
    timeout: Duration,
}

impl UdpUpstream {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn exchange_udp(&self, server: SocketAddr, request: &[u8]) -> Result<Vec<u8>> {
        let bind: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(server).await?;
        socket.send(request).await?;

        let mut buf = vec![0u8; 4096];
        loop {
            let n = socket.recv(&mut buf).await?;
            // stray datagrams with another id are skipped
            if n >= 2 && buf[..2] == request[..2] {
                buf.truncate(n);
                return Ok(buf);
            }
        }
    }

    async fn exchange_tcp(&self, server: SocketAddr, request: &[u8]) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(server).await?;
        let len = u16::try_from(request.len())
            .map_err(|_| AppError::dns_resolution("DNS query too large"))?;
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(request).await?;

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await?;
        let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

impl Default for UdpUpstream {
    fn default() -> Self {
        Self::new(crate::defaults::DNS_QUERY_TIMEOUT)
    }
}

#[async_trait]
impl DnsUpstream for UdpUpstream {
    async fn exchange(&self, server: SocketAddr, request: &Message) -> Result<Message> {
        let bytes = request.to_vec()?;
        let raw = tokio::time::timeout(self.timeout, self.exchange_udp(server, &bytes))
            .await
            .map_err(|_| AppError::dns_resolution(format!("DNS query to {} timed out", server)))??;
        let response = Message::from_vec(&raw)?;

        if response.truncated() {
            let raw = tokio::time::timeout(self.timeout, self.exchange_tcp(server, &bytes))
                .await
                .map_err(|_| AppError::dns_resolution(format!("DNS query to {} timed out", server)))??;
            return Ok(Message::from_vec(&raw)?);
        }

        Ok(response)
    }
}

/// Absolute name for a hostname
pub fn fqdn(host: &str) -> Result<Name> {
    let mut name = Name::from_ascii(host)
        .map_err(|e| AppError::dns_resolution(format!("Invalid hostname '{}': {}", host, e)))?;
    name.set_fqdn(true);
    Ok(name)
}

/// A single-question query message
pub fn build_query(name: &Name, record_type: RecordType, recursion_desired: bool) -> Message {
    let mut message = Message::new();
    message
        .set_id((Uuid::new_v4().as_u128() & 0xffff) as u16)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(recursion_desired)
        .add_query(Query::query(name.clone(), record_type));
    message
}

/// Addresses of the requested type found in the answer section
pub fn answer_addresses(message: &Message, record_type: RecordType) -> Vec<IpAddr> {
    message
        .answers()
        .iter()
        .filter(|record| record.record_type() == record_type)
        .filter_map(|record| record_ip(record.data()))
        .collect()
}

pub(crate) fn record_ip(data: Option<&RData>) -> Option<IpAddr> {
    match data {
        Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
        Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
        _ => None,
    }
}

pub(crate) fn no_such_host(host: &str) -> AppError {
    AppError::dns_resolution(format!("lookup {}: no such host", host))
}

/// Recursive queries against one configured server
pub struct ServerLookup {
    server: SocketAddr,
    upstream: Arc<dyn DnsUpstream>,
}

impl ServerLookup {
    pub fn new(server: SocketAddr, upstream: Arc<dyn DnsUpstream>) -> Self {
        Self { server, upstream }
    }
}

#[async_trait]
impl AddressLookup for ServerLookup {
    async fn lookup(&self, host: &str, record_type: RecordType) -> Result<Vec<IpAddr>> {
        let request = build_query(&fqdn(host)?, record_type, true);
        let response = self.upstream.exchange(self.server, &request).await?;
        match response.response_code() {
            ResponseCode::NoError => Ok(answer_addresses(&response, record_type)),
            ResponseCode::NXDomain => Err(no_such_host(host)),
            other => Err(AppError::dns_resolution(format!(
                "lookup {} on {}: server answered {}",
                host, self.server, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use trust_dns_resolver::proto::rr::rdata::A;
    use trust_dns_resolver::proto::rr::Record;

    #[test]
    fn test_build_query() {
        let name = fqdn("example.com").unwrap();
        let query = build_query(&name, RecordType::AAAA, false);
        assert!(!query.recursion_desired());
        assert_eq!(query.queries().len(), 1);
        assert_eq!(query.queries()[0].query_type(), RecordType::AAAA);
        assert!(query.queries()[0].name().is_fqdn());
    }

    #[test]
    fn test_answer_addresses_filters_type() {
        let name = fqdn("example.com").unwrap();
        let mut message = Message::new();
        message.add_answer(Record::from_rdata(name, 60, RData::A(A(Ipv4Addr::new(192, 0, 2, 1)))));
        assert_eq!(answer_addresses(&message, RecordType::A), vec!["192.0.2.1".parse::<IpAddr>().unwrap()]);
        assert!(answer_addresses(&message, RecordType::AAAA).is_empty());
    }

    #[tokio::test]
    async fn test_udp_exchange_against_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            let (n, peer) = server.recv_from(&mut buf).await.unwrap();
            let request = Message::from_vec(&buf[..n]).unwrap();
            let mut response = Message::new();
            response
                .set_id(request.id())
                .set_message_type(MessageType::Response)
                .set_response_code(ResponseCode::NoError);
            let name = request.queries()[0].name().clone();
            response.add_answer(Record::from_rdata(name, 60, RData::A(A(Ipv4Addr::new(203, 0, 113, 7)))));
            server.send_to(&response.to_vec().unwrap(), peer).await.unwrap();
        });

        let lookup = ServerLookup::new(server_addr, Arc::new(UdpUpstream::new(Duration::from_secs(2))));
        let addrs = lookup.lookup("probe.test", RecordType::A).await.unwrap();
        assert_eq!(addrs, vec!["203.0.113.7".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_udp_exchange_times_out() {
        // bound but never answering
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = UdpUpstream::new(Duration::from_millis(100));
        let request = build_query(&fqdn("example.com").unwrap(), RecordType::A, true);
        let result = upstream.exchange(silent.local_addr().unwrap(), &request).await;
        assert!(matches!(result, Err(AppError::DnsResolution(_))));
    }
}
