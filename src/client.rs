//! Probe engine: one fully instrumented HTTP request per measurement

pub mod alt_svc;
pub mod cookies;
pub mod http3;
pub mod measure_context;
pub mod request;
pub mod stream;
pub mod tls;
pub mod trace;
pub mod transport;

pub use measure_context::{ByteCounters, MeasureContext};
pub use trace::{ConnInfo, HookSet, TlsInfo, TraceContext};
pub use transport::{Transport, TransportSettings};

use crate::{
    dns::{self, Resolver},
    error::{AppError, Result},
    logging::{LogLevel, ProbeLogger},
    models::{Config, Measurement, RuntimeConfig},
    stats::SpanKind,
    types::HttpVersion,
};
use alt_svc::UpgradeState;
use async_trait::async_trait;
use cookies::CookieJar;
use http::header::{HeaderMap, ALT_SVC, CONTENT_ENCODING, LOCATION};
use http::StatusCode;
use request::RequestTemplate;
use std::sync::Arc;
use transport::TransportResponse;
use url::Url;

/// Redirect hops followed within one probe
pub const MAX_REDIRECTS: usize = 10;

/// Cause reported when the response body cannot be drained
pub const BODY_READ_FAILURE: &str = "I/O error while reading payload";

/// Something that can run probes against a target
#[async_trait]
pub trait ProbeClient: Send {
    /// Run one probe; failures are reported inside the measurement
    async fn do_measure(&mut self, follow_redirects: bool) -> Measurement;

    /// Current target, which follows redirects and upgrades
    fn url(&self) -> String;

    /// An independent client (own transport, resolver cache and cookies) for the current target
    fn fresh_instance(&self) -> Result<Box<dyn ProbeClient>>;
}

enum Attempt {
    Done(Measurement),
    Upgraded,
}

/// HTTP/S client built for latency analysis
pub struct WebClient {
    config: Config,
    runtime: RuntimeConfig,
    url: Url,
    template: RequestTemplate,
    transport: Transport,
    cookies: CookieJar,
    counters: Arc<ByteCounters>,
    logger: ProbeLogger,
}

impl WebClient {
    pub fn new(config: &Config, runtime: &RuntimeConfig) -> Result<Self> {
        let resolver = Arc::new(Resolver::new(config, &runtime.logger)?);
        Self::with_resolver(config, runtime, resolver)
    }

    /// Build a client dialing through an existing resolver
    pub fn with_resolver(config: &Config, runtime: &RuntimeConfig, resolver: Arc<Resolver>) -> Result<Self> {
        let url = config.target_url()?;
        let transport = Transport::new(TransportSettings::from_config(config), resolver)?;

        Ok(Self {
            template: RequestTemplate::from_config(config)?,
            cookies: CookieJar::new(config.cookies.clone(), config.keep_cookies),
            counters: Arc::new(ByteCounters::new()),
            logger: ProbeLogger::new(&runtime.logger),
            config: config.clone(),
            runtime: runtime.clone(),
            url,
            transport,
        })
    }

    pub fn current_url(&self) -> &Url {
        &self.url
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Rebind to a new target, notifying the redirect callback
    fn follow_to(&mut self, next: Url) {
        if let Some(callback) = &self.runtime.redirect_callback {
            callback(next.as_str());
        }
        self.config.target = next.to_string();
        self.url = next;
    }

    /// Run one probe
    pub async fn measure(&mut self, follow_redirects: bool) -> Measurement {
        self.cookies.begin_probe();
        let mut state = UpgradeState::Probing;

        loop {
            let context = MeasureContext::new(self.counters.clone());
            let trace = TraceContext::new().attach(context.hooks());
            context.start(SpanKind::Total);
            context.start(SpanKind::ReqAndWait);

            let deadline = tokio::time::Instant::now() + self.config.wait;
            let attempt = self.attempt(&context, &trace, follow_redirects, state);

            let measurement = match tokio::time::timeout_at(deadline, attempt).await {
                Ok(Ok(Attempt::Done(measurement))) => measurement,
                Ok(Ok(Attempt::Upgraded)) => {
                    state = state.next();
                    continue;
                }
                Ok(Err(error)) if state == UpgradeState::Upgrading => {
                    self.logger.log_upgrade_failure(self.url.as_str(), &error).await;
                    self.failed(AppError::protocol_mismatch(HttpVersion::Http3.label()).to_string(), &context)
                }
                Ok(Err(error)) => self.failed(error.to_string(), &context),
                Err(_) => self.failed(
                    AppError::timeout(format!("no complete response within {:?}", self.config.wait)).to_string(),
                    &context,
                ),
            };

            self.logger.log_measurement(self.url.as_str(), &measurement).await;
            return measurement;
        }
    }

    async fn attempt(
        &mut self,
        context: &MeasureContext,
        trace: &TraceContext,
        follow_redirects: bool,
        state: UpgradeState,
    ) -> Result<Attempt> {
        let mut response = self.execute_following(trace, follow_redirects).await?;

        let alt_svc_h3 = advertised_h3(&response.headers);
        if let Some(advertised) = &alt_svc_h3 {
            if self.url.scheme() == "https" && state.may_upgrade(self.config.http_version, response.proto) {
                self.upgrade(advertised, response.proto).await?;
                return Ok(Attempt::Upgraded);
            }
        }

        context.stop(SpanKind::ReqAndWait);
        context.start(SpanKind::Resp);

        let payload_size = match response.body.drain().await {
            Ok(size) => size,
            Err(_) => return Ok(Attempt::Done(self.failed(BODY_READ_FAILURE.to_string(), context))),
        };

        context.stop(SpanKind::Resp);
        context.stop(SpanKind::Total);

        if !self.config.keep_alive() {
            self.transport.close_idle();
        }

        let (in_bytes, out_bytes) = self.counters.take();
        let mut measurement = Measurement {
            proto: response.proto.to_string(),
            status_code: response.status.as_u16(),
            payload_size,
            in_bytes,
            out_bytes,
            socket_reused: response.conn.reused,
            compressed: response.headers.contains_key(CONTENT_ENCODING),
            tls_version: response.conn.tls_version.clone(),
            remote_addr: response.conn.remote_addr,
            alt_svc_h3,
            measures: context.measures(),
            is_failure: false,
            failure_cause: String::new(),
        };

        if response.status.is_server_error() && !self.config.ignore_server_errors {
            measurement.is_failure = true;
            measurement.failure_cause = AppError::server_error().to_string();
        }

        if !matches_forced(self.config.http_version, response.proto) {
            measurement.is_failure = true;
            measurement.failure_cause = AppError::protocol_mismatch(self.config.http_version.label()).to_string();
        }

        Ok(Attempt::Done(measurement))
    }

    /// Execute the request, following redirects when asked
    async fn execute_following(&mut self, trace: &TraceContext, follow_redirects: bool) -> Result<TransportResponse> {
        let mut hops = 0;
        loop {
            let request = self.template.build(&self.url, &self.cookies)?;
            let mut response = self.transport.execute(request, trace).await?;
            self.cookies.absorb(&response.headers);

            if !follow_redirects || !is_redirect(response.status) {
                return Ok(response);
            }
            let Some(location) = response.headers.get(LOCATION).and_then(|l| l.to_str().ok()) else {
                return Ok(response);
            };

            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(AppError::network(format!("stopped after {} redirects", MAX_REDIRECTS)));
            }
            let next = self.url.join(location)?;

            // the connection is only reusable once the body is consumed
            response.body.drain().await?;
            self.logger.log_redirect(self.url.as_str(), next.as_str()).await;
            self.follow_to(next);
        }
    }

    /// Rebuild the transport for HTTP/3 at the advertised authority
    async fn upgrade(&mut self, advertised: &str, from_proto: &str) -> Result<()> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| AppError::validation(format!("URL has no host: {}", self.url)))?;
        let bare_host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        let authority = alt_svc::upgrade_authority(advertised, &bare_host);
        let (new_host, port) = dns::split_host_port(&authority)?;

        let mut url = self.url.clone();
        if new_host.contains(':') {
            url.set_host(Some(&format!("[{}]", new_host)))?;
        } else {
            url.set_host(Some(new_host))?;
        }
        url.set_port(Some(port))
            .map_err(|_| AppError::validation(format!("Cannot set port {} on {}", port, url)))?;

        self.runtime
            .sink
            .write_line(LogLevel::Info, "   ─→     server advertised HTTP/3 endpoint, using HTTP/3");
        self.logger.log_upgrade(from_proto, &authority).await;

        self.transport = self.transport.upgraded()?;
        self.config.http_version = HttpVersion::Http3;
        self.config.target = url.to_string();
        self.url = url;
        Ok(())
    }

    fn failed(&self, cause: String, context: &MeasureContext) -> Measurement {
        let (in_bytes, out_bytes) = self.counters.take();
        let mut measurement = Measurement::failure(cause, context.measures());
        measurement.in_bytes = in_bytes;
        measurement.out_bytes = out_bytes;
        if let Some(conn) = context.conn_info() {
            measurement.remote_addr = conn.remote_addr;
            measurement.socket_reused = conn.reused;
        }
        measurement
    }
}

#[async_trait]
impl ProbeClient for WebClient {
    async fn do_measure(&mut self, follow_redirects: bool) -> Measurement {
        self.measure(follow_redirects).await
    }

    fn url(&self) -> String {
        self.url.to_string()
    }

    fn fresh_instance(&self) -> Result<Box<dyn ProbeClient>> {
        let mut config = self.config.clone();
        config.target = self.url.to_string();
        Ok(Box::new(WebClient::new(&config, &self.runtime)?))
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn advertised_h3(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(ALT_SVC)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(alt_svc::parse_h3)
}

/// Whether the negotiated protocol satisfies a forced HTTP version
fn matches_forced(forced: HttpVersion, proto: &str) -> bool {
    match forced {
        HttpVersion::Auto => true,
        HttpVersion::Http1 => proto.starts_with("HTTP/1."),
        HttpVersion::Http2 => proto == "HTTP/2.0",
        HttpVersion::Http3 => proto == "HTTP/3.0",
    }
}
