//! Performance benchmarks for the hot paths of a probe
//!
//! Measure arithmetic and trace dispatch run for every I/O event of every
//! request; statistics and Alt-Svc parsing run once per probe.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use http_ping::{
    client::{alt_svc, HookSet, TraceContext},
    stats::{Measure, PingStats, RunningStats},
};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn sample_latencies(count: usize) -> Vec<Measure> {
    (0..count)
        .map(|i| {
            if i % 10 == 9 {
                Measure::NOT_STOPPED
            } else {
                Measure::from_nanos(5_000_000 + (i as i64 % 97) * 131_000)
            }
        })
        .collect()
}

fn benchmark_measure_arithmetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("measure_arithmetic");
    let latencies = sample_latencies(1_000);

    group.bench_function("sum_if_valid", |b| {
        b.iter(|| {
            latencies
                .iter()
                .fold(Measure::NOT_INITIALIZED, |acc, m| acc.sum_if_valid(black_box(*m)))
        })
    });

    group.bench_function("divide", |b| {
        b.iter(|| {
            latencies
                .iter()
                .map(|m| m.divide(black_box(3)))
                .filter(Measure::is_valid)
                .count()
        })
    });

    group.bench_function("to_float", |b| {
        b.iter(|| latencies.iter().map(|m| m.as_millis_f64()).sum::<f64>())
    });

    group.finish();
}

fn benchmark_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");

    for size in [10usize, 100, 1_000, 10_000].iter() {
        let latencies = sample_latencies(*size);

        group.bench_with_input(BenchmarkId::new("ping_stats", size), size, |b, _| {
            b.iter(|| PingStats::from_latencies(black_box(&latencies)))
        });

        group.bench_with_input(BenchmarkId::new("running_stats", size), size, |b, _| {
            b.iter(|| {
                let mut stats = RunningStats::new();
                for latency in &latencies {
                    if latency.is_valid() {
                        stats.add_value(latency.as_millis_f64());
                    }
                }
                stats.summary()
            })
        });
    }

    group.finish();
}

fn benchmark_alt_svc(c: &mut Criterion) {
    let mut group = c.benchmark_group("alt_svc");
    let headers = [
        r#"h3=":443"; ma=86400"#,
        r#"h3-29=":443"; ma=86400, h3=":443"; ma=86400"#,
        r#"h2="alt.example.com:8443"; ma=60; persist=1"#,
        "clear",
    ];

    group.bench_function("parse_h3", |b| {
        b.iter(|| {
            headers
                .iter()
                .filter_map(|h| alt_svc::parse_h3(black_box(h)))
                .count()
        })
    });

    group.bench_function("upgrade_authority", |b| {
        b.iter(|| alt_svc::upgrade_authority(black_box(":443"), black_box("example.com")))
    });

    group.finish();
}

fn benchmark_trace_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_dispatch");

    for depth in [1usize, 3, 8].iter() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut trace = TraceContext::new();
        for _ in 0..*depth {
            let counter = counter.clone();
            trace = trace.attach(HookSet::new().on_read(move |n: &usize| {
                counter.fetch_add(*n as u64, Ordering::Relaxed);
            }));
        }

        group.bench_with_input(BenchmarkId::new("fire_read", depth), depth, |b, _| {
            b.iter(|| trace.fire(|h| h.read.as_ref(), black_box(&1460usize)))
        });

        group.bench_with_input(BenchmarkId::new("fire_unhandled", depth), depth, |b, _| {
            b.iter(|| trace.fire(|h| h.write.as_ref(), black_box(&1460usize)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_measure_arithmetic,
    benchmark_statistics,
    benchmark_alt_svc,
    benchmark_trace_dispatch
);

criterion_main!(benches);
