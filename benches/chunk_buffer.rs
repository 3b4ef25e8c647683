use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use webmlive_uploader::buffer::{ChunkBuffer, ClusterSplitter, CLUSTER_ID};

fn bench_write_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_buffer_write_read");

    for size in [4 * 1024usize, 64 * 1024, 512 * 1024] {
        let data = vec![0x55u8; size];
        let mut out = vec![0u8; size];
        let buffer = ChunkBuffer::new(size * 2).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                buffer.write_chunk(black_box(&data)).unwrap();
                black_box(buffer.read_chunk(&mut out).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_split(c: &mut Criterion) {
    let mut stream = Vec::new();
    for i in 0..64u8 {
        stream.extend_from_slice(&CLUSTER_ID);
        stream.extend(std::iter::repeat(i | 0x80).take(16 * 1024));
    }

    let mut group = c.benchmark_group("cluster_splitter");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    for read_size in [4 * 1024usize, 64 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("read_size", read_size),
            &read_size,
            |b, &read_size| {
                b.iter(|| {
                    let mut splitter = ClusterSplitter::new();
                    let mut pieces = 0;
                    for read in stream.chunks(read_size) {
                        pieces += splitter.feed(black_box(read)).len();
                    }
                    black_box(pieces)
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_write_read, bench_split);
criterion_main!(benches);
