//! Benchmarks for container encoding and decoding

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tenmap_core::{DenseArray, Labels, LabelsBuilder, TensorBlock, TensorMap};
use tenmap_io::{load_buffer, read, write, ByteOrder, ReadConfig, WriteConfig};

/// Map with `blocks` blocks of `samples` samples and 32 properties, each with
/// a three-component gradient for every sample
fn build_map(blocks: usize, samples: usize) -> TensorMap {
    let properties = Arc::new(Labels::from_flat(&["n"], (0..32).collect()).unwrap());
    let xyz = Arc::new(Labels::new(["xyz"], &[[0], [1], [2]]).unwrap());

    let mut keys = LabelsBuilder::new(["species"]);
    let mut all_blocks = Vec::with_capacity(blocks);
    for b in 0..blocks {
        keys.add(&[b as i32]);

        let gradient = TensorBlock::new(
            DenseArray::from_elem(&[samples, 3, 32], 0.5),
            Labels::from_flat(&["sample"], (0..samples as i32).collect()).unwrap(),
            vec![xyz.clone()],
            properties.clone(),
        )
        .unwrap();
        let values = (0..samples * 32).map(|i| i as f64 * 1e-3).collect();
        let block = TensorBlock::new(
            DenseArray::from_vec(values, &[samples, 32]).unwrap(),
            Labels::from_flat(&["structure"], (0..samples as i32).collect()).unwrap(),
            vec![],
            properties.clone(),
        )
        .unwrap()
        .with_gradient("positions", gradient)
        .unwrap();
        all_blocks.push(block);
    }

    TensorMap::new(keys.finish().unwrap(), all_blocks).unwrap()
}

fn encode(map: &TensorMap, config: &WriteConfig) -> Vec<u8> {
    let mut bytes = Vec::new();
    write(&mut bytes, map, config).unwrap();
    bytes
}

/// Benchmark writing maps of increasing size
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for (blocks, samples) in [(4, 100), (16, 1_000)] {
        let map = build_map(blocks, samples);
        let size = encode(&map, &WriteConfig::default()).len();
        group.throughput(Throughput::Bytes(size as u64));

        for checksum in [false, true] {
            let config = WriteConfig::new().checksum(checksum);
            group.bench_with_input(
                BenchmarkId::new(
                    if checksum { "crc32" } else { "plain" },
                    format!("{}x{}", blocks, samples),
                ),
                &map,
                |b, map| b.iter(|| black_box(encode(map, &config))),
            );
        }
    }

    group.finish();
}

/// Benchmark reading maps in both byte orders
fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    let map = build_map(16, 1_000);

    for byte_order in [ByteOrder::Little, ByteOrder::Big] {
        let bytes = encode(&map, &WriteConfig::new().byte_order(byte_order));
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("byte_order", format!("{:?}", byte_order)),
            &bytes,
            |b, bytes| b.iter(|| black_box(load_buffer(bytes).unwrap())),
        );
    }

    let bytes = encode(&map, &WriteConfig::default());
    let unverified = ReadConfig::new().verify_checksum(false);
    group.bench_with_input(
        BenchmarkId::new("checksum", "skipped"),
        &bytes,
        |b, bytes| b.iter(|| black_box(read(bytes.as_slice(), &unverified).unwrap())),
    );

    group.finish();
}

criterion_group!(benches, bench_write, bench_read);
criterion_main!(benches);
