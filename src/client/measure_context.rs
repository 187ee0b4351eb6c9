//! Per-probe span recording driven by lifecycle hooks

use super::trace::{ConnInfo, HookSet};
use crate::stats::{MeasuresCollection, SpanKind, TimerRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Raw connection byte counters shared by all probes of a client
#[derive(Debug, Default)]
pub struct ByteCounters {
    read: AtomicU64,
    written: AtomicU64,
}

impl ByteCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_read(&self, n: u64) {
        self.read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_written(&self, n: u64) {
        self.written.fetch_add(n, Ordering::Relaxed);
    }

    /// Read and reset both counters, returning `(in, out)`
    pub fn take(&self) -> (u64, u64) {
        (self.read.swap(0, Ordering::AcqRel), self.written.swap(0, Ordering::AcqRel))
    }
}

/// Timers and connection details collected for one probe
#[derive(Clone)]
pub struct MeasureContext {
    timers: Arc<Mutex<TimerRegistry>>,
    conn: Arc<Mutex<Option<ConnInfo>>>,
    counters: Arc<ByteCounters>,
}

impl MeasureContext {
    pub fn new(counters: Arc<ByteCounters>) -> Self {
        Self {
            timers: Arc::new(Mutex::new(TimerRegistry::new())),
            conn: Arc::new(Mutex::new(None)),
            counters,
        }
    }

    /// Run `f` against the timers
    pub fn with_timers<R>(&self, f: impl FnOnce(&mut TimerRegistry) -> R) -> Option<R> {
        self.timers.lock().ok().map(|mut timers| f(&mut timers))
    }

    pub fn start(&self, kind: SpanKind) {
        self.with_timers(|t| t.get(kind).start());
    }

    pub fn stop(&self, kind: SpanKind) {
        self.with_timers(|t| t.get(kind).stop());
    }

    pub fn measures(&self) -> MeasuresCollection {
        self.with_timers(|t| t.measure()).unwrap_or_default()
    }

    /// Connection reported by the last `got_conn` event
    pub fn conn_info(&self) -> Option<ConnInfo> {
        self.conn.lock().ok().and_then(|conn| conn.clone())
    }

    /// Hooks mapping lifecycle events onto spans and counters
    pub fn hooks(&self) -> HookSet {
        let timers = self.timers.clone();
        let span = move |kind: SpanKind, start: bool| {
            let timers = timers.clone();
            move || {
                if let Ok(mut timers) = timers.lock() {
                    let timer = timers.get(kind);
                    if start {
                        timer.start();
                    } else {
                        timer.stop();
                    }
                }
            }
        };

        let (dns_start, dns_done) = (span(SpanKind::Dns, true), span(SpanKind::Dns, false));
        let (tcp_start, tcp_done) = (span(SpanKind::Tcp, true), span(SpanKind::Tcp, false));
        let (tls_start, tls_done) = (span(SpanKind::Tls, true), span(SpanKind::Tls, false));
        let (quic_start, quic_done) = (span(SpanKind::Quic, true), span(SpanKind::Quic, false));
        let get_conn = span(SpanKind::Conn, true);

        let got_conn_timers = self.timers.clone();
        let conn = self.conn.clone();
        let wrote_timers = self.timers.clone();
        let first_byte_timers = self.timers.clone();
        let (read_counters, write_counters) = (self.counters.clone(), self.counters.clone());

        HookSet::new()
            .on_get_conn(move |_| get_conn())
            .on_dns_start(move |_| dns_start())
            .on_dns_done(move |_| dns_done())
            .on_connect_start(move |_| tcp_start())
            .on_connect_done(move |_| tcp_done())
            .on_tls_start(move |_| tls_start())
            .on_tls_done(move |_| tls_done())
            .on_quic_start(move |_| quic_start())
            .on_quic_done(move |_| quic_done())
            .on_got_conn(move |info| {
                if let Ok(mut timers) = got_conn_timers.lock() {
                    timers.get(SpanKind::Conn).stop();
                    timers.get(SpanKind::Req).start();
                    timers.get(SpanKind::ReqAndWait).start_force();
                }
                if let Ok(mut conn) = conn.lock() {
                    *conn = Some(info.clone());
                }
            })
            .on_wrote_request(move |_| {
                if let Ok(mut timers) = wrote_timers.lock() {
                    timers.get(SpanKind::Req).stop();
                    timers.get(SpanKind::Wait).start_force();
                }
            })
            .on_first_response_byte(move |_| {
                if let Ok(mut timers) = first_byte_timers.lock() {
                    timers.get(SpanKind::Wait).stop();
                    timers.get(SpanKind::ReqAndWait).stop();
                    timers.get(SpanKind::Resp).start();
                }
            })
            .on_read(move |n| read_counters.add_read(*n as u64))
            .on_write(move |n| write_counters.add_written(*n as u64))
    }
}
