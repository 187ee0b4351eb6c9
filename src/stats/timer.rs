//! Named probe spans and the per-probe timer registry

use super::measure::Measure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// The fixed set of spans recorded for every probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpanKind {
    Total,
    Conn,
    Dns,
    Tcp,
    Tls,
    Quic,
    Req,
    Wait,
    Resp,
    ReqAndWait,
}

impl SpanKind {
    pub const ALL: [SpanKind; 10] = [
        SpanKind::Total,
        SpanKind::Conn,
        SpanKind::Dns,
        SpanKind::Tcp,
        SpanKind::Tls,
        SpanKind::Quic,
        SpanKind::Req,
        SpanKind::Wait,
        SpanKind::Resp,
        SpanKind::ReqAndWait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Total => "total",
            SpanKind::Conn => "conn",
            SpanKind::Dns => "dns",
            SpanKind::Tcp => "tcp",
            SpanKind::Tls => "tls",
            SpanKind::Quic => "quic",
            SpanKind::Req => "req",
            SpanKind::Wait => "wait",
            SpanKind::Resp => "resp",
            SpanKind::ReqAndWait => "req+wait",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A start/stop pair where starts keep the earliest and stops keep the latest timestamp.
///
/// Protocol events may fire more than once (retried dials, several writes),
/// so repeated calls widen the span instead of overwriting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    start: Option<Instant>,
    stop: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn stop(&mut self) {
        self.stop_at(Instant::now());
    }

    /// Overwrite the start timestamp with the current time
    pub fn start_force(&mut self) {
        self.start = Some(Instant::now());
    }

    pub fn start_at(&mut self, ts: Instant) {
        self.start = Some(match self.start {
            Some(current) if current <= ts => current,
            _ => ts,
        });
    }

    pub fn stop_at(&mut self, ts: Instant) {
        self.stop = Some(match self.stop {
            Some(current) if current >= ts => current,
            _ => ts,
        });
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    /// Elapsed time between start and stop, clamped at zero
    pub fn duration(&self) -> Duration {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    pub fn measure(&self) -> Measure {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) if stop >= start => Measure::from(stop - start),
            (Some(start), Some(stop)) => {
                let back = Measure::from(start - stop).as_nanos();
                Measure::from_nanos(-back)
            }
            (Some(_), None) => Measure::NOT_STOPPED,
            (None, Some(_)) => Measure::NOT_STARTED,
            (None, None) => Measure::NOT_INITIALIZED,
        }
    }
}

/// Timers for one probe, created on first access
#[derive(Debug, Clone, Default)]
pub struct TimerRegistry {
    timers: BTreeMap<SpanKind, Timer>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, kind: SpanKind) -> &mut Timer {
        self.timers.entry(kind).or_default()
    }

    pub fn measure(&self) -> MeasuresCollection {
        MeasuresCollection {
            measures: self
                .timers
                .iter()
                .map(|(kind, timer)| (*kind, timer.measure()))
                .collect(),
        }
    }
}

/// Read-only span values of one probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasuresCollection {
    measures: BTreeMap<SpanKind, Measure>,
}

impl MeasuresCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A span never touched reads as `NOT_INITIALIZED`
    pub fn get(&self, kind: SpanKind) -> Measure {
        self.measures.get(&kind).copied().unwrap_or(Measure::NOT_INITIALIZED)
    }

    pub fn set(&mut self, kind: SpanKind, measure: Measure) {
        self.measures.insert(kind, measure);
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpanKind, Measure)> + '_ {
        self.measures.iter().map(|(k, m)| (*k, *m))
    }

    /// Fold another collection in with `sum_if_valid`, span by span
    pub fn accumulate(&mut self, other: &MeasuresCollection) {
        for kind in SpanKind::ALL {
            let sum = self.get(kind).sum_if_valid(other.get(kind));
            self.measures.insert(kind, sum);
        }
    }

    /// Divide every span by `n`
    pub fn divide(&self, n: i64) -> MeasuresCollection {
        MeasuresCollection {
            measures: self.measures.iter().map(|(k, m)| (*k, m.divide(n))).collect(),
        }
    }
}
