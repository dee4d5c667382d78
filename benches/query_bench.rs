//! Extraction and sampling benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use readscope::alignment::{extract_mutations, parse_cigar, RegionSampler};

fn benchmark_extraction(c: &mut Criterion) {
    let cigar = parse_cigar("5S40M2I30M3D20M1I50M").expect("valid CIGAR");
    let sequence = "ACGT".repeat(37);
    let md = "12A20C6^GTA5T14G49";

    c.bench_function("extract_mutations_148bp", |b| {
        b.iter(|| extract_mutations(black_box(&cigar), black_box(&sequence), 1_000, Some(md)));
    });

    c.bench_function("parse_cigar", |b| {
        b.iter(|| parse_cigar(black_box("5S40M2I30M3D20M1I50M")));
    });
}

fn benchmark_sampling(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let positions: Vec<u64> = (0..300_000)
        .map(|_| rng.random_range(0..1_000_000))
        .collect();
    let sampler = RegionSampler::default();

    let mut group = c.benchmark_group("sampling");
    group.sample_size(10);
    group.bench_function("stratified_300k_to_100k", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(2);
            sampler.sample(black_box(positions.clone()), 100_000, &mut rng)
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_extraction, benchmark_sampling);
criterion_main!(benches);
