//! Result of a single probe

use crate::stats::{Measure, MeasuresCollection, SpanKind};
use serde::Serialize;
use std::net::SocketAddr;

/// Immutable outcome of one probe, produced exactly once per attempt
#[derive(Debug, Clone, Default, Serialize)]
pub struct Measurement {
    /// Negotiated protocol, e.g. `HTTP/1.1`, `HTTP/2.0`, `HTTP/3.0`
    pub proto: String,
    pub status_code: u16,
    /// Response payload bytes after transfer decoding
    pub payload_size: u64,
    /// Raw bytes read from the connection during the probe
    pub in_bytes: u64,
    /// Raw bytes written to the connection during the probe
    pub out_bytes: u64,
    pub socket_reused: bool,
    pub compressed: bool,
    /// e.g. `TLS-1.3`; empty for plain HTTP
    pub tls_version: String,
    pub remote_addr: Option<SocketAddr>,
    /// Value of the `h3` Alt-Svc token when advertised
    pub alt_svc_h3: Option<String>,
    pub measures: MeasuresCollection,
    pub is_failure: bool,
    pub failure_cause: String,
}

impl Measurement {
    /// A failed probe carrying whatever spans were recorded
    pub fn failure<S: Into<String>>(cause: S, measures: MeasuresCollection) -> Self {
        Self {
            measures,
            is_failure: true,
            failure_cause: cause.into(),
            ..Default::default()
        }
    }

    /// The probe latency used for round-trip statistics
    pub fn latency(&self) -> Measure {
        self.measures.get(SpanKind::Total)
    }

    pub fn is_success(&self) -> bool {
        !self.is_failure
    }
}
