//! # Version Negotiation Benchmarks
//!
//! Negotiation runs on every proxied request, so it is measured per strategy together
//! with the response header stamping that follows it.

use axum::http::{HeaderMap, Uri};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pipeline_gateway::versioning::{ApiVersion, VersionNegotiationStrategy, VersionNegotiator};

fn create_negotiator() -> VersionNegotiator {
    VersionNegotiator::new(vec![
        ApiVersion::new("1").deprecated(),
        ApiVersion::new("2"),
        ApiVersion::new("3"),
    ])
    .unwrap()
}

/// Benchmark negotiation across strategies and signal locations
fn benchmark_negotiation(c: &mut Criterion) {
    let negotiator = create_negotiator();
    let mut group = c.benchmark_group("negotiate_version");

    let cases: [(&str, &str, Option<&str>); 3] = [
        ("header", "/route/pipeline-generator/generate", Some("v2")),
        ("path", "/api/v2/route/pipeline-generator/generate", None),
        ("query", "/route/pipeline-generator/generate?version=2", None),
    ];

    for strategy in [
        VersionNegotiationStrategy::HeaderFirst,
        VersionNegotiationStrategy::PathFirst,
        VersionNegotiationStrategy::QueryFirst,
    ] {
        for (signal, uri, header) in cases {
            let uri: Uri = uri.parse().unwrap();
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), signal),
                &(uri, header),
                |b, (uri, header)| {
                    b.iter(|| negotiator.negotiate_version(black_box(uri), black_box(*header), strategy))
                },
            );
        }
    }

    group.finish();
}

/// Benchmark stamping version headers on a response
fn benchmark_version_headers(c: &mut Criterion) {
    let negotiator = create_negotiator();

    c.bench_function("add_version_headers_deprecated", |b| {
        b.iter(|| {
            let mut headers = HeaderMap::new();
            negotiator.add_version_headers(&mut headers, black_box("1"));
            headers
        })
    });
}

criterion_group!(benches, benchmark_negotiation, benchmark_version_headers);
criterion_main!(benches);
