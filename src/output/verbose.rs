//! Verbose reporter with per-probe latency breakdowns
//!
//! Each successful probe is followed by its connection details and a tree
//! of span durations. The close section adds the average tree and running
//! min/avg/max/stddev per span.

use super::formatter::{format_count, CloseSummary, LineFormatter, INDENT};
use super::PingReporter;
use crate::executor::ThroughputSample;
use crate::logging::{LineSink, LogLevel};
use crate::models::Measurement;
use crate::stats::{MeasuresCollection, RunningStats, SpanKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A node of the latency breakdown
struct SpanNode {
    label: &'static str,
    kind: SpanKind,
    children: Vec<SpanNode>,
}

impl SpanNode {
    fn leaf(label: &'static str, kind: SpanKind) -> Self {
        Self { label, kind, children: Vec::new() }
    }

    fn breakdown() -> Self {
        Self {
            label: "request and response",
            kind: SpanKind::Total,
            children: vec![
                SpanNode {
                    label: "connection setup",
                    kind: SpanKind::Conn,
                    children: vec![
                        SpanNode::leaf("DNS resolution", SpanKind::Dns),
                        SpanNode::leaf("TCP handshake", SpanKind::Tcp),
                        SpanNode::leaf("TLS handshake", SpanKind::Tls),
                        SpanNode::leaf("QUIC handshake", SpanKind::Quic),
                    ],
                },
                SpanNode::leaf("request sending", SpanKind::Req),
                SpanNode::leaf("wait", SpanKind::Wait),
                SpanNode::leaf("response ingestion", SpanKind::Resp),
            ],
        }
    }
}

/// Render the valid spans of `measures` as an indented tree
pub fn draw_breakdown(measures: &MeasuresCollection) -> Vec<String> {
    fn visit(node: &SpanNode, depth: usize, measures: &MeasuresCollection, out: &mut Vec<(usize, String)>) {
        let measure = measures.get(node.kind);
        if measure.is_valid() {
            out.push((depth, format!("{:6.1} ms {}", measure.as_millis_f64(), node.label)));
        }
        for child in &node.children {
            visit(child, depth + 1, measures, out);
        }
    }

    let mut rows = Vec::new();
    visit(&SpanNode::breakdown(), 0, measures, &mut rows);

    let mut lines = Vec::with_capacity(rows.len());
    for (i, (depth, text)) in rows.iter().enumerate() {
        let next_depth = rows.get(i + 1).map(|(d, _)| *d);
        let mut line = String::from(INDENT);
        for level in 0..*depth {
            let pipe = match next_depth {
                Some(next) if next > level => {
                    if level + 1 == *depth {
                        " ├─"
                    } else {
                        " │ "
                    }
                }
                _ => " └─",
            };
            line.push_str(INDENT);
            line.push_str(pipe);
            line.push(' ');
        }
        line.push_str(text);
        lines.push(line);
    }
    lines
}

/// Reporter printing connection details and span breakdowns
pub struct VerboseReporter {
    formatter: LineFormatter,
    sink: Arc<dyn LineSink>,
    throughput: bool,
    audible_bell: bool,
    sum: MeasuresCollection,
    spans: BTreeMap<SpanKind, RunningStats>,
}

impl VerboseReporter {
    pub fn new(formatter: LineFormatter, sink: Arc<dyn LineSink>, throughput: bool, audible_bell: bool) -> Self {
        Self {
            formatter,
            sink,
            throughput,
            audible_bell,
            sum: MeasuresCollection::new(),
            spans: BTreeMap::new(),
        }
    }

    fn write(&self, line: &str) {
        self.sink.write_line(LogLevel::Info, line);
    }

    fn details(&self, measurement: &Measurement) -> Vec<String> {
        let painter = self.formatter.painter();
        let mut lines = vec![
            format!(
                "{}proto={}, socket reused={}, compressed={}",
                INDENT,
                painter.info(&measurement.proto),
                measurement.socket_reused,
                measurement.compressed
            ),
            format!(
                "{}network i/o: bytes read={}, bytes written={}",
                INDENT,
                format_count(measurement.in_bytes),
                format_count(measurement.out_bytes)
            ),
        ];
        if !measurement.tls_version.is_empty() {
            lines.push(format!("{}tls version={}", INDENT, measurement.tls_version));
        }
        if let Some(advertised) = &measurement.alt_svc_h3 {
            lines.push(format!("{}alt-svc h3={}", INDENT, painter.muted(advertised)));
        }
        lines
    }
}

impl PingReporter for VerboseReporter {
    fn on_measure(&mut self, measurement: &Measurement, id: u64) {
        if self.throughput {
            return;
        }
        self.write(&self.formatter.probe_line(id, measurement));
        if measurement.is_failure {
            return;
        }
        if self.audible_bell {
            self.write("\x07");
        }

        for line in self.details(measurement) {
            self.write(&line);
        }

        self.sum.accumulate(&measurement.measures);
        for (kind, measure) in measurement.measures.iter() {
            if measure.is_valid() {
                self.spans.entry(kind).or_default().add_value(measure.as_millis_f64());
            }
        }

        self.write("");
        self.write(&format!("{}latency contributions:", INDENT));
        for line in draw_breakdown(&measurement.measures) {
            self.write(&line);
        }
        self.write("");
    }

    fn on_tick(&mut self, sample: &ThroughputSample) {
        self.write(&self.formatter.throughput_line(sample));
    }

    fn on_close(&mut self, url: &str, summary: &CloseSummary) {
        self.write("");
        for line in self.formatter.close_lines(url, summary) {
            self.write(&line);
        }
        if summary.successes == 0 {
            return;
        }

        self.write("");
        self.write("average latency contributions:");
        for line in draw_breakdown(&self.sum.divide(summary.successes as i64)) {
            self.write(&line);
        }

        self.write("");
        self.write("span statistics (min/avg/max/stddev):");
        for (kind, stats) in &self.spans {
            if *kind == SpanKind::ReqAndWait {
                continue;
            }
            let s = stats.summary();
            self.write(&format!(
                "{}{:<6} {:.3}/{:.3}/{:.3}/{:.3} ms",
                INDENT, kind.as_str(), s.min, s.average, s.max, s.std_dev
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::output::colored::Painter;
    use crate::stats::{Measure, PingStats};
    use std::time::Duration;

    fn ms(v: u64) -> Measure {
        Measure::from(Duration::from_millis(v))
    }

    fn measures() -> MeasuresCollection {
        let mut measures = MeasuresCollection::new();
        measures.set(SpanKind::Total, ms(30));
        measures.set(SpanKind::Conn, ms(10));
        measures.set(SpanKind::Dns, ms(2));
        measures.set(SpanKind::Tcp, ms(8));
        measures.set(SpanKind::Req, ms(1));
        measures.set(SpanKind::Wait, ms(15));
        measures.set(SpanKind::Resp, ms(4));
        measures
    }

    #[test]
    fn test_breakdown_skips_missing_spans() {
        let lines = draw_breakdown(&measures());
        assert_eq!(lines.len(), 7);
        assert!(lines[0].ends_with("30.0 ms request and response"));
        assert!(lines.iter().all(|l| !l.contains("TLS handshake")));
        assert!(lines[2].contains("DNS resolution"));
        assert!(lines[3].contains("└─"));
        assert!(lines[6].contains("└─"));
    }

    #[test]
    fn test_reporter_output() {
        let sink = Arc::new(MemorySink::new());
        let mut reporter = VerboseReporter::new(LineFormatter::new(Painter::new(false)), sink.clone(), false, false);
        let measurement = Measurement {
            proto: "HTTP/1.1".to_string(),
            status_code: 200,
            in_bytes: 1500,
            measures: measures(),
            ..Default::default()
        };
        reporter.on_measure(&measurement, 0);
        reporter.on_close(
            "http://example.com/",
            &CloseSummary { attempts: 1, successes: 1, stats: PingStats::from_latencies(&[ms(30)]) },
        );

        let contents = sink.contents();
        assert!(contents.contains("proto=HTTP/1.1, socket reused=false, compressed=false"));
        assert!(contents.contains("bytes read=1.5 kB"));
        assert!(contents.contains("average latency contributions:"));
        assert!(contents.contains("total  30.000/30.000/30.000/0.000 ms"));
    }
}
