#![allow(missing_docs)]
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::{RngCore, rng};

use zgs_primitives::{FileHandle, SEGMENT_SIZE, merkle::segment_root, verify_segment};

fn bench_segment_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_root");

    for size in [4096, 65536, SEGMENT_SIZE].iter() {
        let mut data = vec![0u8; *size];
        rng().fill_bytes(&mut data);

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| segment_root(data, 0));
        });
    }

    group.finish();
}

fn bench_file_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_root");
    group.sample_size(10);

    for segments in [1usize, 4, 16].iter() {
        let mut data = vec![0u8; segments * SEGMENT_SIZE + 1000];
        rng().fill_bytes(&mut data);

        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(segments), &data, |b, data| {
            // a fresh handle per iteration so the cached tree is not reused
            b.iter(|| FileHandle::from_bytes(data.clone()).root_hash().unwrap());
        });
    }

    group.finish();
}

fn bench_segment_proof(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_proof");

    let mut data = vec![0u8; 16 * SEGMENT_SIZE];
    rng().fill_bytes(&mut data);
    let file = FileHandle::from_bytes(data);
    let root = file.root_hash().unwrap();
    let segment = file.read_segment(7).unwrap();
    let proof = file.proof_at(7).unwrap();

    group.bench_function("generate", |b| {
        b.iter(|| file.proof_at(7).unwrap());
    });

    group.bench_function("verify", |b| {
        b.iter(|| {
            verify_segment(file.layout(), &root, file.size(), 7, &segment.data, &proof).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_segment_root, bench_file_root, bench_segment_proof);
criterion_main!(benches);
