//! Benchmarks for the ingestion path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serial_scope::config::AppConfig;
use serial_scope::pipeline::{sink_for, FrameDecoder, Packet, SampleWindow};
use serial_scope::state::UiSnapshot;
use serial_scope::types::{IngestMode, SamplePoint};

fn sample_stream(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("0,{:.3},{:.3}\r\n", i as f64 * 0.01, (i as f64 * 0.01).sin()))
        .collect()
}

fn bench_frame_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decoding");
    let stream = sample_stream(1000);

    for chunk_size in [16usize, 256, 1024].iter() {
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("handle", chunk_size),
            chunk_size,
            |b, &chunk_size| {
                let chunks: Vec<&str> = stream
                    .as_bytes()
                    .chunks(chunk_size)
                    .map(|c| std::str::from_utf8(c).unwrap_or(""))
                    .collect();
                b.iter(|| {
                    let mut decoder = FrameDecoder::new();
                    let mut count = 0;
                    for chunk in &chunks {
                        count += decoder.handle(black_box(chunk)).len();
                    }
                    count
                });
            },
        );
    }

    group.finish();
}

fn bench_packet_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_parsing");

    group.bench_function("sample", |b| b.iter(|| Packet::parse(black_box("0,12.345,-6.789"))));
    group.bench_function("malformed", |b| b.iter(|| Packet::parse(black_box("0,abc,2"))));

    group.finish();
}

fn bench_window_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample_window");

    for capacity in [100usize, 10_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("append_at_capacity", capacity),
            capacity,
            |b, &capacity| {
                let mut window = SampleWindow::new(capacity);
                for i in 0..capacity {
                    window.append(SamplePoint::new(i as f64, 0.0));
                }
                let mut x = capacity as f64;
                b.iter(|| {
                    x += 1.0;
                    window.append(black_box(SamplePoint::new(x, x.sin())));
                });
            },
        );
    }

    group.finish();
}

fn bench_plot_sink_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("plot_sink");
    let frames: Vec<String> = sample_stream(100)
        .lines()
        .map(|l| l.trim().to_string())
        .collect();

    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("accept_all_100", |b| {
        let mut sink = sink_for(IngestMode::Plot);
        let mut snapshot = UiSnapshot::from_config(&AppConfig::default());
        b.iter(|| sink.accept_all(black_box(&frames), &mut snapshot));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_decoding,
    bench_packet_parsing,
    bench_window_append,
    bench_plot_sink_batch,
);
criterion_main!(benches);
