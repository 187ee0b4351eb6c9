//! Composable request lifecycle hooks
//!
//! A [`TraceContext`] carries an ordered list of [`HookSet`]s. Emit sites call
//! [`TraceContext::fire`] with a field selector; every set that has a handler
//! for that field runs, newest attachment first. Sets know nothing about each
//! other, so independent observers (timers, byte counters, loggers) can watch
//! the same request.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// A lifecycle callback
pub type Hook<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Connection obtained for a request
#[derive(Debug, Clone)]
pub struct ConnInfo {
    pub remote_addr: Option<SocketAddr>,
    pub reused: bool,
    /// e.g. `TLS-1.3`, empty for plain connections
    pub tls_version: String,
}

/// Outcome of a TLS or QUIC handshake
#[derive(Debug, Clone)]
pub struct TlsInfo {
    pub version: String,
    pub alpn: Option<String>,
}

/// Optional handlers for every request lifecycle event
#[derive(Default, Clone)]
pub struct HookSet {
    /// Connection requested for `host:port`
    pub get_conn: Option<Hook<str>>,
    pub dns_start: Option<Hook<str>>,
    pub dns_done: Option<Hook<SocketAddr>>,
    pub connect_start: Option<Hook<SocketAddr>>,
    pub connect_done: Option<Hook<SocketAddr>>,
    pub tls_start: Option<Hook<()>>,
    pub tls_done: Option<Hook<TlsInfo>>,
    pub quic_start: Option<Hook<SocketAddr>>,
    pub quic_done: Option<Hook<SocketAddr>>,
    pub got_conn: Option<Hook<ConnInfo>>,
    /// Request bytes hit the wire; may fire several times per request
    pub wrote_request: Option<Hook<()>>,
    pub first_response_byte: Option<Hook<()>>,
    /// Raw bytes read from the connection
    pub read: Option<Hook<usize>>,
    /// Raw bytes written to the connection
    pub write: Option<Hook<usize>>,
}

macro_rules! hook_setters {
    ($($setter:ident => $field:ident : $arg:ty),* $(,)?) => {
        impl HookSet {
            $(
                pub fn $setter<F>(mut self, f: F) -> Self
                where
                    F: Fn(&$arg) + Send + Sync + 'static,
                {
                    self.$field = Some(Arc::new(f) as Hook<$arg>);
                    self
                }
            )*
        }
    };
}

hook_setters! {
    on_get_conn => get_conn: str,
    on_dns_start => dns_start: str,
    on_dns_done => dns_done: SocketAddr,
    on_connect_start => connect_start: SocketAddr,
    on_connect_done => connect_done: SocketAddr,
    on_tls_start => tls_start: (),
    on_tls_done => tls_done: TlsInfo,
    on_quic_start => quic_start: SocketAddr,
    on_quic_done => quic_done: SocketAddr,
    on_got_conn => got_conn: ConnInfo,
    on_wrote_request => wrote_request: (),
    on_first_response_byte => first_response_byte: (),
    on_read => read: usize,
    on_write => write: usize,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .field("got_conn", &self.got_conn.is_some())
            .finish_non_exhaustive()
    }
}

/// The hook sets attached to one logical request, newest first
#[derive(Clone, Default, Debug)]
pub struct TraceContext {
    sets: Vec<Arc<HookSet>>,
}

impl TraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new context whose handlers run before those already attached
    pub fn attach(&self, hooks: HookSet) -> TraceContext {
        self.attach_shared(Arc::new(hooks))
    }

    pub fn attach_shared(&self, hooks: Arc<HookSet>) -> TraceContext {
        let mut sets = Vec::with_capacity(self.sets.len() + 1);
        sets.push(hooks);
        sets.extend(self.sets.iter().cloned());
        TraceContext { sets }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Invoke the selected handler of every attached set
    pub fn fire<A: ?Sized>(&self, select: impl Fn(&HookSet) -> Option<&Hook<A>>, arg: &A) {
        for set in &self.sets {
            if let Some(hook) = select(set) {
                hook(arg);
            }
        }
    }
}
