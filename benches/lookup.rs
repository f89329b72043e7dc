use std::time::Duration;

use blockify::{LookupTable, Palette};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};

fn bench_build(c: &mut Criterion, group: &str, build: impl Fn(&Palette, u32) -> LookupTable) {
    let mut group = c.benchmark_group(group);
    group
        .sample_size(10)
        .noise_threshold(0.05)
        .sampling_mode(SamplingMode::Flat)
        .warm_up_time(Duration::from_secs(2));

    let palette = Palette::blocks();
    for shards in [1, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(shards), &shards, |b, &shards| {
            b.iter(|| build(&palette, shards));
        });
    }
}

fn lookup_single(c: &mut Criterion) {
    bench_build(c, "lookup_single", |palette, shards| {
        LookupTable::build(palette, shards).unwrap()
    });
}

fn lookup_par(c: &mut Criterion) {
    bench_build(c, "lookup_par", |palette, shards| {
        LookupTable::build_par(palette, shards).unwrap()
    });
}

criterion_group!(benches, lookup_single, lookup_par);
criterion_main!(benches);
