//! Request-executing transports bound to one resolver
//!
//! HTTP/1.1 and HTTP/2 run over hyper client connections dialed here, so every
//! phase of connection setup can be reported to the request's trace. HTTP/3
//! lives in [`super::http3`].

use super::http3::{QuicBody, QuicTransport};
use super::stream::{ConnStream, TraceSlot, TracedStream};
use super::tls;
use super::trace::{ConnInfo, TlsInfo, TraceContext};
use crate::dns::Resolver;
use crate::error::{AppError, Result};
use crate::models::Config;
use crate::types::HttpVersion;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONNECTION, HOST};
use http::uri::{Authority, Uri};
use http::{Request, Response, StatusCode, Version};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::client::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

/// Connections idle longer than this are not reused
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Bound on waiting for a pooled connection to accept a new request
const POOL_READY_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport construction parameters
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub http_version: HttpVersion,
    pub keep_alive: bool,
    pub insecure: bool,
    pub idle_timeout: Duration,
    /// Dial this `host:port` instead of the request authority
    pub conn_target: Option<String>,
}

impl TransportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http_version: config.http_version,
            keep_alive: config.keep_alive(),
            insecure: config.insecure,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            conn_target: config.conn_target.clone(),
        }
    }

    /// The same settings with HTTP/3 forced
    pub fn upgraded(&self) -> Self {
        Self { http_version: HttpVersion::Http3, ..self.clone() }
    }
}

/// Response head plus a body still to be drained
pub struct TransportResponse {
    pub status: StatusCode,
    /// `HTTP/1.1`, `HTTP/2.0` or `HTTP/3.0`
    pub proto: &'static str,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub conn: ConnInfo,
}

pub enum ResponseBody {
    Hyper(Incoming),
    Quic(Box<QuicBody>),
    #[cfg(test)]
    Fixed(u64),
}

impl ResponseBody {
    /// Read the body to the end, returning the payload size
    pub async fn drain(&mut self) -> Result<u64> {
        match self {
            ResponseBody::Hyper(body) => {
                let mut total = 0u64;
                while let Some(frame) = body.frame().await {
                    let frame = frame.map_err(|_| AppError::body_read())?;
                    if let Some(data) = frame.data_ref() {
                        total += data.len() as u64;
                    }
                }
                Ok(total)
            }
            ResponseBody::Quic(body) => body.drain().await,
            #[cfg(test)]
            ResponseBody::Fixed(size) => Ok(*size),
        }
    }
}

/// HTTP/1.1-or-2 over TCP, or HTTP/3 over QUIC
pub enum Transport {
    Tcp(TcpTransport),
    Quic(QuicTransport),
    #[cfg(test)]
    Scripted(scripted::ScriptedTransport),
}

impl Transport {
    pub fn new(settings: TransportSettings, resolver: Arc<Resolver>) -> Result<Self> {
        if settings.http_version == HttpVersion::Http3 {
            Ok(Transport::Quic(QuicTransport::new(settings, resolver)?))
        } else {
            Ok(Transport::Tcp(TcpTransport::new(settings, resolver)?))
        }
    }

    /// Send `request` (absolute URI) and return once the response head is in
    pub async fn execute(&mut self, request: Request<()>, trace: &TraceContext) -> Result<TransportResponse> {
        match self {
            Transport::Tcp(t) => t.execute(request, trace).await,
            Transport::Quic(t) => t.execute(request, trace).await,
            #[cfg(test)]
            Transport::Scripted(t) => t.execute(),
        }
    }

    /// A transport with the same settings and resolver, HTTP/3 forced
    pub fn upgraded(&mut self) -> Result<Transport> {
        match self {
            #[cfg(test)]
            Transport::Scripted(t) => t.upgraded(),
            _ => Transport::new(self.settings().upgraded(), self.resolver()),
        }
    }

    pub fn settings(&self) -> &TransportSettings {
        match self {
            Transport::Tcp(t) => &t.settings,
            Transport::Quic(t) => t.settings(),
            #[cfg(test)]
            Transport::Scripted(t) => &t.settings,
        }
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        match self {
            Transport::Tcp(t) => t.resolver.clone(),
            Transport::Quic(t) => t.resolver(),
            #[cfg(test)]
            Transport::Scripted(t) => t.resolver.clone(),
        }
    }

    pub fn is_quic(&self) -> bool {
        matches!(self, Transport::Quic(_))
    }

    pub fn close_idle(&mut self) {
        match self {
            Transport::Tcp(t) => t.pooled = None,
            Transport::Quic(t) => t.close_idle(),
            #[cfg(test)]
            Transport::Scripted(_) => {}
        }
    }
}

/// `host:port` of an absolute URI, IPv6 hosts bracketed
pub(crate) fn uri_authority(uri: &Uri) -> Result<(String, String, bool)> {
    let https = match uri.scheme_str() {
        Some("https") => true,
        Some("http") => false,
        other => {
            return Err(AppError::validation(format!(
                "Unsupported URL scheme: {}",
                other.unwrap_or("none")
            )))
        }
    };
    let host = uri
        .host()
        .ok_or_else(|| AppError::validation(format!("URL has no host: {}", uri)))?;
    let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
    let bare_host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    let authority = if bare_host.contains(':') {
        format!("[{}]:{}", bare_host, port)
    } else {
        format!("{}:{}", bare_host, port)
    };
    Ok((authority, bare_host, https))
}

/// Move a `Host` header override into the URI authority
pub(crate) fn apply_host_override(parts: &mut http::request::Parts) -> Result<()> {
    if let Some(host) = parts.headers.remove(HOST) {
        let host = host
            .to_str()
            .map_err(|_| AppError::validation("Host header is not valid ASCII"))?;
        let authority = host
            .parse::<Authority>()
            .map_err(|e| AppError::validation(format!("Invalid Host header '{}': {}", host, e)))?;
        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.authority = Some(authority);
        parts.uri = Uri::from_parts(uri_parts)
            .map_err(|e| AppError::validation(format!("Invalid request URI: {}", e)))?;
    }
    Ok(())
}

enum Sender {
    H1(http1::SendRequest<Empty<Bytes>>),
    H2(http2::SendRequest<Empty<Bytes>>),
}

impl Sender {
    fn is_closed(&self) -> bool {
        match self {
            Sender::H1(s) => s.is_closed(),
            Sender::H2(s) => s.is_closed(),
        }
    }

    async fn ready(&mut self) -> Result<()> {
        match self {
            Sender::H1(s) => s.ready().await?,
            Sender::H2(s) => s.ready().await?,
        }
        Ok(())
    }

    async fn send(&mut self, request: Request<Empty<Bytes>>) -> Result<Response<Incoming>> {
        let response = match self {
            Sender::H1(s) => s.send_request(request).await?,
            Sender::H2(s) => s.send_request(request).await?,
        };
        Ok(response)
    }
}

struct PooledConn {
    authority: String,
    sender: Sender,
    info: ConnInfo,
    idle_since: Instant,
}

/// HTTP/1.1 and HTTP/2 over plain or TLS TCP connections
pub struct TcpTransport {
    settings: TransportSettings,
    resolver: Arc<Resolver>,
    tls: TlsConnector,
    slot: Arc<TraceSlot>,
    pooled: Option<PooledConn>,
}

impl TcpTransport {
    pub fn new(settings: TransportSettings, resolver: Arc<Resolver>) -> Result<Self> {
        let alpn: &[&[u8]] = match settings.http_version {
            HttpVersion::Http1 => &[tls::ALPN_H1],
            HttpVersion::Http2 => &[tls::ALPN_H2],
            _ => &[tls::ALPN_H2, tls::ALPN_H1],
        };
        let config = tls::client_config(settings.insecure, alpn, false)?;

        Ok(Self {
            settings,
            resolver,
            tls: TlsConnector::from(Arc::new(config)),
            slot: Arc::new(TraceSlot::new()),
            pooled: None,
        })
    }

    pub async fn execute(&mut self, request: Request<()>, trace: &TraceContext) -> Result<TransportResponse> {
        self.slot.install(trace.clone());

        let (authority, host, https) = uri_authority(request.uri())?;
        trace.fire(|h| h.get_conn.as_ref(), authority.as_str());

        let (mut sender, info) = match self.take_pooled(&authority).await {
            Some(pooled) => (pooled.sender, ConnInfo { reused: true, ..pooled.info }),
            None => self.dial(&authority, &host, https, trace).await?,
        };
        trace.fire(|h| h.got_conn.as_ref(), &info);

        let request = self.shape_request(request, &sender)?;

        self.slot.set_awaiting_response(true);
        let response = sender.send(request).await;
        self.slot.set_awaiting_response(false);
        let response = response?;
        trace.fire(|h| h.first_response_byte.as_ref(), &());

        let proto = match (&sender, response.version()) {
            (Sender::H2(_), _) => "HTTP/2.0",
            (Sender::H1(_), Version::HTTP_10) => "HTTP/1.0",
            (Sender::H1(_), _) => "HTTP/1.1",
        };

        if self.settings.keep_alive {
            self.pooled = Some(PooledConn {
                authority,
                sender,
                info: info.clone(),
                idle_since: Instant::now(),
            });
        }

        let (parts, body) = response.into_parts();
        Ok(TransportResponse {
            status: parts.status,
            proto,
            headers: parts.headers,
            body: ResponseBody::Hyper(body),
            conn: info,
        })
    }

    /// The pooled connection when it still targets `authority` and can take a request
    async fn take_pooled(&mut self, authority: &str) -> Option<PooledConn> {
        let mut pooled = self.pooled.take()?;
        if pooled.authority != authority
            || pooled.idle_since.elapsed() >= self.settings.idle_timeout
            || pooled.sender.is_closed()
        {
            return None;
        }
        match tokio::time::timeout(POOL_READY_TIMEOUT, pooled.sender.ready()).await {
            Ok(Ok(())) => Some(pooled),
            _ => None,
        }
    }

    async fn dial(
        &self,
        authority: &str,
        host: &str,
        https: bool,
        trace: &TraceContext,
    ) -> Result<(Sender, ConnInfo)> {
        let target = self.settings.conn_target.as_deref().unwrap_or(authority);

        trace.fire(|h| h.dns_start.as_ref(), host);
        let addr = self.resolver.resolve_conn_addr(target).await?;
        trace.fire(|h| h.dns_done.as_ref(), &addr);

        trace.fire(|h| h.connect_start.as_ref(), &addr);
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| AppError::network(format!("dial tcp {}: {}", addr, e)))?;
        trace.fire(|h| h.connect_done.as_ref(), &addr);
        let _ = tcp.set_nodelay(true);

        let traced = TracedStream::new(tcp, self.slot.clone());

        let (stream, alpn, tls_version) = if https {
            trace.fire(|h| h.tls_start.as_ref(), &());
            let tls = self
                .tls
                .connect(tls::server_name(host)?, traced)
                .await
                .map_err(|e| AppError::tls(format!("handshake with {} failed: {}", host, e)))?;
            let (_, session) = tls.get_ref();
            let info = TlsInfo {
                version: tls::version_label(session.protocol_version()),
                alpn: session
                    .alpn_protocol()
                    .map(|p| String::from_utf8_lossy(p).into_owned()),
            };
            trace.fire(|h| h.tls_done.as_ref(), &info);
            (ConnStream::Tls(Box::new(tls)), info.alpn, info.version)
        } else {
            (ConnStream::Plain(traced), None, String::new())
        };

        let use_h2 = match alpn.as_deref() {
            Some("h2") => true,
            Some(_) => false,
            // h2c with prior knowledge when forced on plain http
            None => !https && self.settings.http_version == HttpVersion::Http2,
        };

        let io = TokioIo::new(stream);
        let sender = if use_h2 {
            let (sender, conn) = http2::handshake(TokioExecutor::new(), io).await?;
            tokio::spawn(async move {
                let _ = conn.await;
            });
            Sender::H2(sender)
        } else {
            let (sender, conn) = http1::handshake(io).await?;
            tokio::spawn(async move {
                let _ = conn.await;
            });
            Sender::H1(sender)
        };

        Ok((sender, ConnInfo { remote_addr: Some(addr), reused: false, tls_version }))
    }

    /// Adapt an absolute-URI request to the wire form of the connection
    fn shape_request(&self, request: Request<()>, sender: &Sender) -> Result<Request<Empty<Bytes>>> {
        let (mut parts, ()) = request.into_parts();

        match sender {
            Sender::H1(_) => {
                if !parts.headers.contains_key(HOST) {
                    let authority = parts
                        .uri
                        .authority()
                        .map(|a| a.as_str().to_string())
                        .unwrap_or_default();
                    let value = HeaderValue::from_str(&authority)
                        .map_err(|_| AppError::validation(format!("Invalid host '{}'", authority)))?;
                    parts.headers.insert(HOST, value);
                }
                let origin = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/")
                    .parse::<Uri>()
                    .map_err(|e| AppError::validation(format!("Invalid request path: {}", e)))?;
                parts.uri = origin;
                parts.version = Version::HTTP_11;
                if !self.settings.keep_alive {
                    parts.headers.insert(CONNECTION, HeaderValue::from_static("close"));
                }
            }
            Sender::H2(_) => {
                apply_host_override(&mut parts)?;
                parts.version = Version::HTTP_2;
            }
        }

        Ok(Request::from_parts(parts, Empty::new()))
    }
}

/// Canned responses standing in for a network connection
#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use http::header::ALT_SVC;
    use std::collections::VecDeque;

    /// One canned response head
    pub struct Reply {
        pub proto: &'static str,
        pub status: u16,
        pub alt_svc: Option<&'static str>,
        pub size: u64,
    }

    impl Reply {
        pub fn ok(proto: &'static str) -> Self {
            Self { proto, status: 200, alt_svc: None, size: 2 }
        }

        pub fn advertising(mut self, alt_svc: &'static str) -> Self {
            self.alt_svc = Some(alt_svc);
            self
        }
    }

    pub struct ScriptedTransport {
        pub settings: TransportSettings,
        pub resolver: Arc<Resolver>,
        replies: VecDeque<Result<Reply>>,
        /// Replies of the transport built by an upgrade
        upgrade: Option<Vec<Result<Reply>>>,
    }

    impl ScriptedTransport {
        pub fn new(
            settings: TransportSettings,
            resolver: Arc<Resolver>,
            replies: Vec<Result<Reply>>,
            upgrade: Option<Vec<Result<Reply>>>,
        ) -> Self {
            Self { settings, resolver, replies: replies.into(), upgrade }
        }

        pub fn execute(&mut self) -> Result<TransportResponse> {
            let reply = self
                .replies
                .pop_front()
                .unwrap_or_else(|| Err(AppError::network("no scripted reply left")))?;
            let mut headers = HeaderMap::new();
            if let Some(alt_svc) = reply.alt_svc {
                headers.insert(ALT_SVC, HeaderValue::from_static(alt_svc));
            }
            Ok(TransportResponse {
                status: StatusCode::from_u16(reply.status)
                    .map_err(|e| AppError::internal(e.to_string()))?,
                proto: reply.proto,
                headers,
                body: ResponseBody::Fixed(reply.size),
                conn: ConnInfo { remote_addr: None, reused: false, tls_version: "TLS-1.3".to_string() },
            })
        }

        pub fn upgraded(&mut self) -> Result<Transport> {
            let replies = self
                .upgrade
                .take()
                .ok_or_else(|| AppError::network("no upgrade scripted"))?;
            Ok(Transport::Scripted(ScriptedTransport::new(
                self.settings.upgraded(),
                self.resolver.clone(),
                replies,
                None,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IpProtocol;

    #[test]
    fn test_uri_authority() {
        let uri: Uri = "https://example.com/a".parse().unwrap();
        assert_eq!(uri_authority(&uri).unwrap(), ("example.com:443".to_string(), "example.com".to_string(), true));

        let uri: Uri = "http://[::1]:8080/".parse().unwrap();
        assert_eq!(uri_authority(&uri).unwrap(), ("[::1]:8080".to_string(), "::1".to_string(), false));

        let uri: Uri = "ftp://example.com/".parse().unwrap();
        assert!(uri_authority(&uri).is_err());
    }

    #[test]
    fn test_host_override_rewrites_authority() {
        let request = Request::builder()
            .uri("https://192.0.2.1/path?q=1")
            .header(HOST, "example.com")
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();
        apply_host_override(&mut parts).unwrap();
        assert_eq!(parts.uri.to_string(), "https://example.com/path?q=1");
        assert!(!parts.headers.contains_key(HOST));
    }

    #[test]
    fn test_h3_settings_build_quic_transport() {
        let settings = TransportSettings {
            http_version: HttpVersion::Http1,
            keep_alive: true,
            insecure: false,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            conn_target: None,
        };
        let resolver = Arc::new(Resolver::system(IpProtocol::Any));
        let upgraded = settings.upgraded();
        assert_eq!(upgraded.http_version, HttpVersion::Http3);
        assert!(upgraded.keep_alive);

        let transport = Transport::new(settings, resolver).unwrap();
        assert!(!transport.is_quic());
    }
}
