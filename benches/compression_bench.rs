use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tzp::codec::Algorithm;
fn bench_compression(c: &mut Criterion) {
    let data = vec![0u8; 1024 * 1024];
    let zstd = Algorithm::Zstd { level: 6 };
    let lz4 = Algorithm::Lz4Fast;
    c.bench_function("zstd6_compress_1mb", |b| b.iter(|| zstd.compress(black_box(&data))));
    c.bench_function("lz4_compress_1mb", |b| b.iter(|| lz4.compress(black_box(&data))));
}
criterion_group!(benches, bench_compression);
criterion_main!(benches);
