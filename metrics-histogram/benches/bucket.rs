use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use metrics_histogram::{pack, truncate, unpack, wire, Histogram, DEFAULT_PRECISION};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::hint::black_box;

fn get_samples(len: usize) -> Vec<f64> {
    // Seeded so every run benchmarks the same data.
    let mut rng = Xoshiro256StarStar::seed_from_u64(len as u64);

    // Latency-like values between 1ms and 10s, in nanoseconds.
    (0..len).map(|_| rng.random_range(1.0e6..1.0e10)).collect()
}

fn codec_benchmark(c: &mut Criterion) {
    let samples = get_samples(1024);

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(samples.len() as u64));
    group.bench_function("truncate", |b| {
        b.iter(|| {
            for sample in &samples {
                black_box(truncate(*sample, DEFAULT_PRECISION));
            }
        })
    });
    group.bench_function("pack/unpack", |b| {
        b.iter(|| {
            for sample in &samples {
                black_box(unpack(pack(*sample, DEFAULT_PRECISION), DEFAULT_PRECISION));
            }
        })
    });
    group.finish();
}

fn histogram_benchmark(c: &mut Criterion) {
    let samples = get_samples(100_000);

    let mut group = c.benchmark_group("histogram");
    group.throughput(Throughput::Elements(samples.len() as u64));
    group.bench_function("from_samples", |b| {
        b.iter_batched(
            || samples.clone(),
            |samples| Histogram::from_samples(samples, DEFAULT_PRECISION),
            BatchSize::LargeInput,
        )
    });

    let histogram = Histogram::from_samples(samples.iter().copied(), DEFAULT_PRECISION)
        .expect("default precision is valid");
    group.bench_function("encode packed", |b| b.iter(|| wire::packed::to_vec(&histogram)));
    group.bench_function("encode json", |b| b.iter(|| wire::json::to_vec(&histogram)));
    group.finish();
}

criterion_group!(benches, codec_benchmark, histogram_benchmark);
criterion_main!(benches);
