//! Fingerprint benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use snapcache::fingerprint::fingerprint;

fn bench_fingerprint(c: &mut Criterion) {
    let query = "page=1&sort=asc&filter=active";
    let small_body = b"{\"id\":1}".to_vec();
    let large_body = vec![0x42u8; 64 * 1024];

    c.bench_function("fingerprint_get_query_only", |b| {
        b.iter(|| fingerprint(black_box("GET"), black_box(query), black_box(b"")));
    });

    c.bench_function("fingerprint_post_small_body", |b| {
        b.iter(|| fingerprint(black_box("POST"), black_box(""), black_box(&small_body)));
    });

    c.bench_function("fingerprint_post_64k_body", |b| {
        b.iter(|| fingerprint(black_box("POST"), black_box(""), black_box(&large_body)));
    });
}

criterion_group!(benches, bench_fingerprint);
criterion_main!(benches);
