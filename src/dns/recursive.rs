//! Iterative resolution starting from the root servers

use super::upstream::{answer_addresses, build_query, fqdn, no_such_host, record_ip, DnsUpstream};
use super::AddressLookup;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use trust_dns_resolver::proto::op::{Message, ResponseCode};
use trust_dns_resolver::proto::rr::{Name, RData, RecordType};

/// IANA root servers a through m
const ROOT_SERVERS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(170, 247, 170, 2),
    Ipv4Addr::new(192, 33, 4, 12),
    Ipv4Addr::new(199, 7, 91, 13),
    Ipv4Addr::new(192, 203, 230, 10),
    Ipv4Addr::new(192, 5, 5, 241),
    Ipv4Addr::new(192, 112, 36, 4),
    Ipv4Addr::new(198, 97, 190, 53),
    Ipv4Addr::new(192, 36, 148, 17),
    Ipv4Addr::new(192, 58, 128, 30),
    Ipv4Addr::new(193, 0, 14, 129),
    Ipv4Addr::new(199, 7, 83, 42),
    Ipv4Addr::new(202, 12, 27, 33),
];

pub const MAX_CNAME_HOPS: usize = 8;
pub const MAX_REFERRALS: usize = 16;
/// Nesting of name server name resolutions
const MAX_NS_DEPTH: usize = 4;
/// Servers tried per step before giving up on a zone
const SERVERS_PER_STEP: usize = 4;

/// Resolver walking the delegation chain itself
pub struct RecursiveLookup {
    upstream: Arc<dyn DnsUpstream>,
    roots: Vec<SocketAddr>,
}

impl RecursiveLookup {
    pub fn new(upstream: Arc<dyn DnsUpstream>) -> Self {
        let roots = ROOT_SERVERS
            .iter()
            .map(|ip| SocketAddr::new(IpAddr::V4(*ip), 53))
            .collect();
        Self::with_roots(upstream, roots)
    }

    pub fn with_roots(upstream: Arc<dyn DnsUpstream>, roots: Vec<SocketAddr>) -> Self {
        Self { upstream, roots }
    }

    fn resolve_name(&self, host: Name, record_type: RecordType, depth: usize) -> BoxFuture<'_, Result<Vec<IpAddr>>> {
        async move {
            let mut name = host;
            let mut cname_hops = 0;

            'chase: loop {
                let mut servers = self.roots.clone();

                for _ in 0..MAX_REFERRALS {
                    let response = self.ask(&servers, &name, record_type).await?;
                    if response.response_code() == ResponseCode::NXDomain {
                        return Err(no_such_host(&name.to_string()));
                    }

                    let addrs = answer_addresses(&response, record_type);
                    if !addrs.is_empty() {
                        return Ok(addrs);
                    }

                    if let Some(target) = cname_target(&response, &name) {
                        cname_hops += 1;
                        if cname_hops > MAX_CNAME_HOPS {
                            return Err(AppError::dns_resolution(format!(
                                "lookup {}: CNAME chain longer than {}",
                                name, MAX_CNAME_HOPS
                            )));
                        }
                        name = target;
                        continue 'chase;
                    }

                    let ns_names = referral_names(&response);
                    if !response.answers().is_empty() || ns_names.is_empty() {
                        // authoritative answer without records of this type
                        return Ok(Vec::new());
                    }

                    let glue = glue_addresses(&response, &ns_names);
                    servers = if glue.is_empty() {
                        self.resolve_name_servers(&ns_names, depth).await?
                    } else {
                        glue
                    };
                }

                return Err(AppError::dns_resolution(format!(
                    "lookup {}: more than {} referrals",
                    name, MAX_REFERRALS
                )));
            }
        }
        .boxed()
    }

    async fn resolve_name_servers(&self, ns_names: &[Name], depth: usize) -> Result<Vec<SocketAddr>> {
        if depth >= MAX_NS_DEPTH {
            return Err(AppError::dns_resolution("name server delegation nested too deeply"));
        }

        for ns in ns_names {
            if let Ok(addrs) = self.resolve_name(ns.clone(), RecordType::A, depth + 1).await {
                if !addrs.is_empty() {
                    return Ok(addrs.into_iter().map(|ip| SocketAddr::new(ip, 53)).collect());
                }
            }
        }

        Err(AppError::dns_resolution("no reachable name server in referral"))
    }

    async fn ask(&self, servers: &[SocketAddr], name: &Name, record_type: RecordType) -> Result<Message> {
        let request = build_query(name, record_type, false);
        let mut last_error = None;

        for server in servers.iter().take(SERVERS_PER_STEP) {
            match self.upstream.exchange(*server, &request).await {
                Ok(response) => return Ok(response),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::dns_resolution("no name servers to ask")))
    }
}

#[async_trait]
impl AddressLookup for RecursiveLookup {
    async fn lookup(&self, host: &str, record_type: RecordType) -> Result<Vec<IpAddr>> {
        self.resolve_name(fqdn(host)?, record_type, 0).await
    }
}

fn cname_target(response: &Message, name: &Name) -> Option<Name> {
    response
        .answers()
        .iter()
        .filter(|record| record.name() == name)
        .find_map(|record| match record.data() {
            Some(RData::CNAME(cname)) => Some(cname.0.clone()),
            _ => None,
        })
}

fn referral_names(response: &Message) -> Vec<Name> {
    response
        .name_servers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::NS(ns)) => Some(ns.0.clone()),
            _ => None,
        })
        .collect()
}

/// Glue addresses for the referred name servers, IPv4 first
fn glue_addresses(response: &Message, ns_names: &[Name]) -> Vec<SocketAddr> {
    let mut glue: Vec<IpAddr> = response
        .additionals()
        .iter()
        .filter(|record| ns_names.contains(record.name()))
        .filter_map(|record| record_ip(record.data()))
        .collect();
    glue.sort_by_key(|ip| ip.is_ipv6());
    glue.into_iter().map(|ip| SocketAddr::new(ip, 53)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use trust_dns_resolver::proto::op::MessageType;
    use trust_dns_resolver::proto::rr::rdata::{A, CNAME, NS};
    use trust_dns_resolver::proto::rr::Record;

    /// Canned zone data keyed by (server, name)
    #[derive(Default)]
    struct FakeUpstream {
        zones: HashMap<(SocketAddr, String), Message>,
        asked: Mutex<Vec<(SocketAddr, String)>>,
    }

    impl FakeUpstream {
        fn answer(mut self, server: SocketAddr, name: &str, message: Message) -> Self {
            self.zones.insert((server, name.to_string()), message);
            self
        }
    }

    #[async_trait]
    impl DnsUpstream for FakeUpstream {
        async fn exchange(&self, server: SocketAddr, request: &Message) -> Result<Message> {
            let name = request.queries()[0].name().to_string();
            assert!(!request.recursion_desired());
            self.asked.lock().unwrap().push((server, name.clone()));
            let mut response = self
                .zones
                .get(&(server, name))
                .cloned()
                .ok_or_else(|| AppError::network("unreachable"))?;
            response.set_id(request.id()).set_message_type(MessageType::Response);
            Ok(response)
        }
    }

    fn server(last: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), 53)
    }

    fn name(s: &str) -> Name {
        fqdn(s).unwrap()
    }

    fn a(owner: &str, ip: [u8; 4]) -> Record {
        Record::from_rdata(name(owner), 300, RData::A(A(Ipv4Addr::from(ip))))
    }

    fn referral(zone: &str, ns: &str, glue: Option<[u8; 4]>) -> Message {
        let mut message = Message::new();
        message.add_name_server(Record::from_rdata(name(zone), 300, RData::NS(NS(name(ns)))));
        if let Some(ip) = glue {
            message.add_additional(a(ns, ip));
        }
        message
    }

    fn answer(records: Vec<Record>) -> Message {
        let mut message = Message::new();
        for record in records {
            message.add_answer(record);
        }
        message
    }

    #[tokio::test]
    async fn test_follows_glue_referrals() {
        let upstream = FakeUpstream::default()
            .answer(server(1), "www.example.com.", referral("com.", "a.gtld.test.", Some([10, 0, 0, 2])))
            .answer(server(2), "www.example.com.", referral("example.com.", "ns.example.com.", Some([10, 0, 0, 3])))
            .answer(server(3), "www.example.com.", answer(vec![a("www.example.com.", [192, 0, 2, 80])]));
        let upstream = Arc::new(upstream);

        let lookup = RecursiveLookup::with_roots(upstream.clone(), vec![server(1)]);
        let addrs = lookup.lookup("www.example.com", RecordType::A).await.unwrap();

        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 80))]);
        assert_eq!(upstream.asked.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_follows_cname_from_root() {
        let cname = Record::from_rdata(name("alias.example.com."), 300, RData::CNAME(CNAME(name("real.example.net."))));
        let upstream = FakeUpstream::default()
            .answer(server(1), "alias.example.com.", answer(vec![cname]))
            .answer(server(1), "real.example.net.", answer(vec![a("real.example.net.", [198, 51, 100, 1])]));

        let lookup = RecursiveLookup::with_roots(Arc::new(upstream), vec![server(1)]);
        let addrs = lookup.lookup("alias.example.com", RecordType::A).await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1))]);
    }

    #[tokio::test]
    async fn test_cname_loop_is_bounded() {
        let looping = Record::from_rdata(name("loop.test."), 300, RData::CNAME(CNAME(name("loop.test."))));
        let upstream = FakeUpstream::default().answer(server(1), "loop.test.", answer(vec![looping]));

        let lookup = RecursiveLookup::with_roots(Arc::new(upstream), vec![server(1)]);
        let err = lookup.lookup("loop.test", RecordType::A).await.unwrap_err();
        assert!(err.to_string().contains("CNAME chain"));
    }

    #[tokio::test]
    async fn test_resolves_name_server_without_glue() {
        let upstream = FakeUpstream::default()
            .answer(server(1), "www.example.org.", referral("example.org.", "ns.other.test.", None))
            .answer(server(1), "ns.other.test.", answer(vec![a("ns.other.test.", [10, 0, 0, 4])]))
            .answer(server(4), "www.example.org.", answer(vec![a("www.example.org.", [203, 0, 113, 9])]));

        let lookup = RecursiveLookup::with_roots(Arc::new(upstream), vec![server(1)]);
        let addrs = lookup.lookup("www.example.org", RecordType::A).await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))]);
    }

    #[tokio::test]
    async fn test_nxdomain() {
        let mut nx = Message::new();
        nx.set_response_code(ResponseCode::NXDomain);
        let upstream = FakeUpstream::default().answer(server(1), "missing.test.", nx);

        let lookup = RecursiveLookup::with_roots(Arc::new(upstream), vec![server(1)]);
        let err = lookup.lookup("missing.test", RecordType::A).await.unwrap_err();
        assert!(err.to_string().contains("no such host"));
    }

    #[tokio::test]
    async fn test_no_records_of_type() {
        let upstream = FakeUpstream::default()
            .answer(server(1), "v4only.test.", answer(vec![]));

        let lookup = RecursiveLookup::with_roots(Arc::new(upstream), vec![server(1)]);
        assert!(lookup.lookup("v4only.test", RecordType::AAAA).await.unwrap().is_empty());
    }

    #[test]
    fn test_glue_prefers_ipv4() {
        let mut message = referral("example.com.", "ns.example.com.", None);
        message.add_additional(Record::from_rdata(
            name("ns.example.com."),
            300,
            RData::AAAA(trust_dns_resolver::proto::rr::rdata::AAAA("2001:db8::53".parse().unwrap())),
        ));
        message.add_additional(a("ns.example.com.", [192, 0, 2, 53]));

        let glue = glue_addresses(&message, &[name("ns.example.com.")]);
        assert_eq!(glue[0], "192.0.2.53:53".parse().unwrap());
        assert_eq!(glue.len(), 2);
    }
}
