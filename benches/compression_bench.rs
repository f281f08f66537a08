use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lazy_zip::{ArchiveOptions, CompressionMethod, EntrySource, Zipper};
use std::io;

fn generate_compressible_data(size: usize) -> Vec<u8> {
    // Pattern that compresses well
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    // Pseudo-random data that doesn't compress well
    let mut data = Vec::with_capacity(size);
    let mut state = 0x12345678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// Stream a single-entry archive into a sink
fn stream_one(options: ArchiveOptions, data: &[u8]) -> u64 {
    let mut zipper = Zipper::with_options(options);
    zipper
        .add_entry("test.bin", EntrySource::bytes(black_box(data).to_vec()))
        .unwrap();
    zipper.finish().unwrap();
    zipper.write_to(&mut io::sink()).unwrap()
}

fn bench_compression_methods(c: &mut Criterion) {
    let sizes = vec![
        1024,             // 1KB
        10 * 1024,        // 10KB
        100 * 1024,       // 100KB
        1024 * 1024,      // 1MB
        10 * 1024 * 1024, // 10MB
    ];

    for size in sizes {
        let mut group = c.benchmark_group(format!("stream_compressible_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_compressible_data(size);

        group.bench_with_input(BenchmarkId::new("stored", size), &data, |b, data| {
            let options = ArchiveOptions::new().method(CompressionMethod::Stored);
            b.iter(|| stream_one(options, data));
        });

        for level in [1, 6, 9] {
            group.bench_with_input(
                BenchmarkId::new(format!("deflate_level_{}", level), size),
                &data,
                |b, data| {
                    let options = ArchiveOptions::new().level(level);
                    b.iter(|| stream_one(options, data));
                },
            );
        }

        group.finish();
    }
}

fn bench_random_data_compression(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024]; // 100KB, 1MB

    for size in sizes {
        let mut group = c.benchmark_group(format!("stream_random_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_random_data(size);

        group.bench_with_input(BenchmarkId::new("deflate_level_6", size), &data, |b, data| {
            b.iter(|| stream_one(ArchiveOptions::new(), data));
        });

        group.finish();
    }
}

fn bench_multiple_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_multiple_entries");

    let entry_count = 100;
    let entry_size = 10 * 1024; // 10KB per entry
    group.throughput(Throughput::Bytes((entry_count * entry_size) as u64));

    let data = generate_compressible_data(entry_size);

    group.bench_function("deflate_100_entries", |b| {
        b.iter(|| {
            let mut zipper = Zipper::new();
            for i in 0..entry_count {
                zipper
                    .add_entry(format!("file_{}.txt", i), EntrySource::bytes(data.clone()))
                    .unwrap();
            }
            zipper.finish().unwrap();
            zipper.write_to(&mut io::sink()).unwrap()
        });
    });

    group.bench_function("lazy_enumerator_100_entries", |b| {
        b.iter(|| {
            let data = data.clone();
            let entries = (0..entry_count)
                .map(move |i| (format!("file_{}.txt", i), EntrySource::bytes(data.clone())));
            let mut zipper = Zipper::from_entries(entries);
            zipper.write_to(&mut io::sink()).unwrap()
        });
    });

    group.bench_function("spilled_100_entries", |b| {
        b.iter(|| {
            let mut zipper = Zipper::new();
            for i in 0..entry_count {
                zipper.start_entry(format!("file_{}.txt", i)).unwrap();
                zipper.write_data(black_box(&data)).unwrap();
            }
            zipper.finish().unwrap();
            zipper.write_to(&mut io::sink()).unwrap()
        });
    });

    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}MB", bytes / (1024 * 1024))
    }
}

criterion_group!(
    benches,
    bench_compression_methods,
    bench_random_data_compression,
    bench_multiple_entries
);
criterion_main!(benches);
