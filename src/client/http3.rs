//! HTTP/3 over QUIC
//!
//! QUIC owns its UDP socket, so raw byte counts come from connection
//! statistics deltas instead of a stream wrapper.

use super::tls;
use super::trace::{ConnInfo, TraceContext};
use super::transport::{apply_host_override, uri_authority, ResponseBody, TransportResponse, TransportSettings};
use crate::dns::Resolver;
use crate::error::{AppError, Result};
use bytes::{Buf, Bytes};
use futures::future::poll_fn;
use http::Request;
use quinn::crypto::rustls::QuicClientConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// QUIC carries its handshake in TLS 1.3 only
pub const QUIC_TLS_VERSION: &str = "TLS-1.3";

type H3Sender = h3::client::SendRequest<h3_quinn::OpenStreams, Bytes>;
type H3Stream = h3::client::RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>;

struct QuicConn {
    authority: String,
    conn: quinn::Connection,
    sender: H3Sender,
    info: ConnInfo,
    idle_since: Instant,
}

/// UDP byte counters of a connection at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct UdpBaseline {
    rx: u64,
    tx: u64,
}

impl UdpBaseline {
    fn of(conn: &quinn::Connection) -> Self {
        let stats = conn.stats();
        Self { rx: stats.udp_rx.bytes, tx: stats.udp_tx.bytes }
    }

    /// Fire read/write hooks for the bytes exchanged between `self` and `now`
    fn report(self, now: UdpBaseline, trace: &TraceContext) -> UdpBaseline {
        let rx = now.rx.saturating_sub(self.rx) as usize;
        let tx = now.tx.saturating_sub(self.tx) as usize;
        trace.fire(|h| h.read.as_ref(), &rx);
        trace.fire(|h| h.write.as_ref(), &tx);
        now
    }
}

/// Response body of one HTTP/3 request
pub struct QuicBody {
    stream: H3Stream,
    conn: quinn::Connection,
    trace: TraceContext,
    baseline: UdpBaseline,
}

impl QuicBody {
    pub async fn drain(&mut self) -> Result<u64> {
        let mut total = 0u64;
        let result = loop {
            match self.stream.recv_data().await {
                Ok(Some(chunk)) => total += chunk.remaining() as u64,
                Ok(None) => break Ok(total),
                Err(_) => break Err(AppError::body_read()),
            }
        };
        self.report_bytes();
        result
    }

    /// Report UDP bytes exchanged since the request started
    fn report_bytes(&mut self) {
        self.baseline = self.baseline.report(UdpBaseline::of(&self.conn), &self.trace);
    }
}

/// HTTP/3 transport with at most one pooled connection
pub struct QuicTransport {
    settings: TransportSettings,
    resolver: Arc<Resolver>,
    client_config: quinn::ClientConfig,
    endpoint: Option<(bool, quinn::Endpoint)>,
    pooled: Option<QuicConn>,
}

impl QuicTransport {
    pub fn new(settings: TransportSettings, resolver: Arc<Resolver>) -> Result<Self> {
        let mut tls_config = tls::client_config(settings.insecure, &[tls::ALPN_H3], true)?;
        tls_config.enable_early_data = true;
        let crypto = QuicClientConfig::try_from(tls_config)
            .map_err(|e| AppError::tls(format!("QUIC TLS configuration: {}", e)))?;

        Ok(Self {
            settings,
            resolver,
            client_config: quinn::ClientConfig::new(Arc::new(crypto)),
            endpoint: None,
            pooled: None,
        })
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        self.resolver.clone()
    }

    pub fn close_idle(&mut self) {
        if let Some(pooled) = self.pooled.take() {
            pooled.conn.close(0u32.into(), b"idle");
        }
    }

    pub async fn execute(&mut self, request: Request<()>, trace: &TraceContext) -> Result<TransportResponse> {
        let (authority, host, https) = uri_authority(request.uri())?;
        if !https {
            return Err(AppError::validation("HTTP/3 requires an https:// URL"));
        }
        trace.fire(|h| h.get_conn.as_ref(), authority.as_str());

        let (mut quic, reused) = match self.take_pooled(&authority) {
            Some(pooled) => (pooled, true),
            None => (self.dial(&authority, &host, trace).await?, false),
        };
        let baseline = if reused { UdpBaseline::of(&quic.conn) } else { UdpBaseline::default() };

        let info = ConnInfo { reused, ..quic.info.clone() };
        trace.fire(|h| h.got_conn.as_ref(), &info);

        let (mut parts, ()) = request.into_parts();
        apply_host_override(&mut parts)?;
        parts.version = http::Version::HTTP_3;
        let request = Request::from_parts(parts, ());

        let exchange = async {
            let mut stream = quic.sender.send_request(request).await?;
            stream.finish().await?;
            trace.fire(|h| h.wrote_request.as_ref(), &());

            let response = stream.recv_response().await?;
            trace.fire(|h| h.first_response_byte.as_ref(), &());
            Ok::<_, AppError>((stream, response))
        };
        let (stream, response) = match exchange.await {
            Ok(exchanged) => exchanged,
            Err(error) => {
                baseline.report(UdpBaseline::of(&quic.conn), trace);
                return Err(error);
            }
        };

        let body = QuicBody {
            stream,
            conn: quic.conn.clone(),
            trace: trace.clone(),
            baseline,
        };

        if self.settings.keep_alive {
            quic.idle_since = Instant::now();
            self.pooled = Some(quic);
        }

        let (parts, ()) = response.into_parts();
        Ok(TransportResponse {
            status: parts.status,
            proto: "HTTP/3.0",
            headers: parts.headers,
            body: ResponseBody::Quic(Box::new(body)),
            conn: info,
        })
    }

    fn take_pooled(&mut self, authority: &str) -> Option<QuicConn> {
        let pooled = self.pooled.take()?;
        if pooled.authority == authority
            && pooled.idle_since.elapsed() < self.settings.idle_timeout
            && pooled.conn.close_reason().is_none()
        {
            Some(pooled)
        } else {
            None
        }
    }

    fn endpoint_for(&mut self, addr: SocketAddr) -> Result<quinn::Endpoint> {
        let ipv6 = addr.is_ipv6();
        if let Some((family, endpoint)) = &self.endpoint {
            if *family == ipv6 {
                return Ok(endpoint.clone());
            }
        }
        let bind: SocketAddr = if ipv6 {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0, 0, 0, 0], 0))
        };
        let mut endpoint = quinn::Endpoint::client(bind)
            .map_err(|e| AppError::network(format!("Failed to open QUIC endpoint: {}", e)))?;
        endpoint.set_default_client_config(self.client_config.clone());
        self.endpoint = Some((ipv6, endpoint.clone()));
        Ok(endpoint)
    }

    async fn dial(&mut self, authority: &str, host: &str, trace: &TraceContext) -> Result<QuicConn> {
        let target = self.settings.conn_target.clone().unwrap_or_else(|| authority.to_string());

        trace.fire(|h| h.dns_start.as_ref(), host);
        let addr = self.resolver.resolve_conn_addr(&target).await?;
        trace.fire(|h| h.dns_done.as_ref(), &addr);

        let endpoint = self.endpoint_for(addr)?;

        trace.fire(|h| h.quic_start.as_ref(), &addr);
        let connecting = endpoint.connect_with(self.client_config.clone(), addr, host)?;
        let conn = match connecting.into_0rtt() {
            Ok((conn, _accepted)) => conn,
            Err(connecting) => connecting.await?,
        };
        trace.fire(|h| h.quic_done.as_ref(), &addr);

        let (mut driver, sender) = h3::client::new(h3_quinn::Connection::new(conn.clone())).await?;
        tokio::spawn(async move {
            let _ = poll_fn(|cx| driver.poll_close(cx)).await;
        });

        Ok(QuicConn {
            authority: authority.to_string(),
            conn,
            sender,
            info: ConnInfo {
                remote_addr: Some(addr),
                reused: false,
                tls_version: QUIC_TLS_VERSION.to_string(),
            },
            idle_since: Instant::now(),
        })
    }
}
