//! Benchmarks for blocklist domain lookup.
//!
//! Measures how quickly we can check if a domain is blocked.

use criterion::{black_box, BenchmarkId, Criterion, Throughput};

use fusedns::filter::{load_host_text, BlocklistIndex};
use rustc_hash::FxHashSet;

fn hosts(count: usize) -> String {
    (0..count)
        .map(|i| format!("0.0.0.0 ads{i}.tracker{}.example\n", i % 97))
        .collect()
}

fn bench_exists(c: &mut Criterion) {
    let blocklist = BlocklistIndex::new();
    load_host_text(&blocklist, &hosts(50_000), &FxHashSet::default());
    blocklist.set("doubleclick.com", true);

    let mut group = c.benchmark_group("blocklist");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("exists", "hit"), |b| {
        b.iter(|| blocklist.exists(black_box("doubleclick.com")))
    });

    // Names are normalized before the lookup
    group.bench_function(BenchmarkId::new("exists", "hit_fqdn_mixed_case"), |b| {
        b.iter(|| blocklist.exists(black_box("DoubleClick.COM.")))
    });

    group.bench_function(BenchmarkId::new("exists", "miss"), |b| {
        b.iter(|| blocklist.exists(black_box("www.google.com")))
    });

    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let text = hosts(10_000);
    let whitelist = FxHashSet::default();

    c.bench_function("load_host_text_10k", |b| {
        b.iter(|| {
            let blocklist = BlocklistIndex::new();
            load_host_text(&blocklist, black_box(&text), &whitelist)
        })
    });
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_exists(&mut criterion);
    bench_load(&mut criterion);
    criterion.final_summary();
}
