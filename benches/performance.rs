//! Performance benchmarks for the CPU-bound parts of a scan
//!
//! Network stages are dominated by I/O; these cover what runs on the
//! scanner's own cycles: block expansion, catalog lookups, ranking and CSV
//! rendering.

use anycast_endpoint_scanner::{
    aggregate::{rank, RankingMode},
    catalog::LocationCatalog,
    expander::{shuffle_with, AddressExpander},
    models::{DownloadMeasurement, Endpoint, ProbeResult, SpeedTestResult},
    output::CsvExporter,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const CODES: [&str; 6] = ["SJC", "LAX", "NRT", "FRA", "SIN", "AMS"];

fn results(count: usize) -> Vec<SpeedTestResult> {
    (0..count)
        .map(|i| {
            let probe = ProbeResult {
                endpoint: Endpoint::new(IpAddr::V4(Ipv4Addr::from(0x6810_0000 + i as u32)), 443),
                facility_code: CODES[i % CODES.len()].to_string(),
                region: "North America".to_string(),
                city: "San Jose".to_string(),
                country_code: "US".to_string(),
                latency: Duration::from_millis((i * 7919 % 300) as u64),
            };
            let download = if i % 11 == 0 {
                DownloadMeasurement::Failed("reset".to_string())
            } else {
                DownloadMeasurement::Completed {
                    bytes: (i * 104_729 % 50_000_000) as u64,
                    elapsed: Duration::from_secs(10),
                    aborted_early: false,
                }
            };
            SpeedTestResult::with_download(probe, download)
        })
        .collect()
}

fn benchmark_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("expansion");
    let expander = AddressExpander::new(443);

    for prefix in [24u8, 20, 16] {
        let line = format!("104.16.0.0/{}", prefix);
        group.bench_with_input(BenchmarkId::new("ipv4_block", prefix), &line, |b, line| {
            b.iter(|| expander.expand_lines([black_box(line.as_str())]))
        });
    }

    let mixed = [
        "# comment",
        "104.16.0.0/22",
        "172.64.0.1:8443",
        "[2606:4700::1]:2053",
        "2606:4700::/120",
        "not-an-address",
        "",
    ];
    group.bench_function("mixed_lines", |b| {
        b.iter(|| expander.expand_lines(black_box(mixed)))
    });

    group.finish();
}

fn benchmark_shuffle(c: &mut Criterion) {
    let endpoints = AddressExpander::new(443)
        .expand_lines(["104.16.0.0/16"])
        .endpoints;

    c.bench_function("shuffle_65536", |b| {
        let mut rng = StdRng::seed_from_u64(7);
        b.iter_batched(
            || endpoints.clone(),
            |mut endpoints| shuffle_with(&mut endpoints, &mut rng),
            criterion::BatchSize::LargeInput,
        )
    });
}

fn benchmark_catalog_lookup(c: &mut Criterion) {
    let body = format!(
        "[{}]",
        CODES
            .iter()
            .map(|code| format!(
                r#"{{"iata":"{}","lat":0.0,"lon":0.0,"cca2":"US","region":"Region","city":"City"}}"#,
                code
            ))
            .collect::<Vec<_>>()
            .join(",")
    );
    let catalog = LocationCatalog::from_json(&body).unwrap();

    c.bench_function("catalog_lookup", |b| {
        b.iter(|| {
            for code in CODES.iter().chain(["ZZZ"].iter()) {
                black_box(catalog.get(black_box(code)));
            }
        })
    });
}

fn benchmark_ranking(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking");

    for count in [100usize, 1_000, 10_000] {
        let input = results(count);
        group.bench_with_input(BenchmarkId::new("by_speed", count), &input, |b, input| {
            b.iter_batched(
                || input.clone(),
                |mut r| rank(&mut r, RankingMode::BySpeed),
                criterion::BatchSize::LargeInput,
            )
        });
        group.bench_with_input(BenchmarkId::new("by_latency", count), &input, |b, input| {
            b.iter_batched(
                || input.clone(),
                |mut r| rank(&mut r, RankingMode::ByLatency),
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn benchmark_csv(c: &mut Criterion) {
    let input = results(1_000);
    let exporter = CsvExporter::new("bench.csv", true, true);

    c.bench_function("csv_1000_rows", |b| {
        b.iter(|| {
            let mut buffer = Vec::with_capacity(64 * 1024);
            exporter.write_to(&mut buffer, black_box(&input)).unwrap();
            buffer
        })
    });
}

criterion_group!(
    benches,
    benchmark_expansion,
    benchmark_shuffle,
    benchmark_catalog_lookup,
    benchmark_ranking,
    benchmark_csv
);
criterion_main!(benches);
