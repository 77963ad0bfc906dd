//! 锁键计算基准测试

use criterion::{Criterion, criterion_group, criterion_main};
use pals::{lock_key, qualified_name};
use std::hint::black_box;

fn bench_lock_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_key");

    group.bench_function("short_name", |b| {
        b.iter(|| lock_key(black_box("billing.nightly-invoice")))
    });

    let long_name = qualified_name("billing", &"x".repeat(256));
    group.bench_function("long_name", |b| b.iter(|| lock_key(black_box(&long_name))));

    group.bench_function("qualify_and_hash", |b| {
        b.iter(|| lock_key(&qualified_name(black_box("billing"), black_box("nightly-invoice"))))
    });

    group.finish();
}

criterion_group!(benches, bench_lock_key);
criterion_main!(benches);
