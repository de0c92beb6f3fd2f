//! Benchmarks for the answer cache.
//!
//! Run with: cargo bench --bench cache_bench

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};

use fusedns::cache::AnswerCache;
use fusedns::dns::response_from_cache;

fn answer(domain: &str) -> Message {
    let name = Name::from_str(domain).unwrap();
    let mut message = Message::new();
    message
        .set_id(0x1234)
        .set_message_type(MessageType::Response)
        .set_recursion_desired(true)
        .set_recursion_available(true);
    message.add_query(Query::query(name.clone(), RecordType::A));
    message.add_answer(Record::from_rdata(name, 300, RData::A(A(Ipv4Addr::new(93, 184, 216, 34)))));
    message
}

fn filled_cache(count: usize, max_count: usize) -> AnswerCache {
    let cache = AnswerCache::new(Duration::from_secs(3600), max_count);
    for i in 0..count {
        let domain = format!("host{i}.example.com.");
        cache
            .set(&format!("host{i}.example.com|IN|A"), Some(answer(&domain)), false)
            .unwrap();
    }
    cache
}

fn bench_get(c: &mut Criterion) {
    let cache = filled_cache(10_000, 0);
    let mut request = answer("host42.example.com.");
    request.take_answers();
    request.set_id(0xBEEF).set_message_type(MessageType::Query);

    let mut group = c.benchmark_group("cache_get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hit", |b| {
        b.iter(|| {
            let hit = cache.get(black_box("host42.example.com|IN|A")).unwrap();
            response_from_cache(hit.message.as_deref().unwrap(), &request)
        })
    });

    group.bench_function("miss", |b| {
        b.iter(|| cache.get(black_box("absent.example.com|IN|A")).is_err())
    });

    group.finish();
}

fn bench_set(c: &mut Criterion) {
    let message = answer("www.example.com.");

    c.bench_function("cache_set_overwrite", |b| {
        let cache = AnswerCache::new(Duration::from_secs(3600), 0);
        b.iter(|| cache.set(black_box("www.example.com|IN|A"), Some(message.clone()), false))
    });

    c.bench_function("cache_set_evicting", |b| {
        let cache = filled_cache(1_000, 1_000);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            cache.set(&format!("new{i}.example.com|IN|A"), Some(message.clone()), false)
        })
    });
}

criterion_group!(benches, bench_get, bench_set);
criterion_main!(benches);
