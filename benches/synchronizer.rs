//! Criterion benchmarks for the ingest and analysis hot paths.
//!
//! Key metrics:
//! - Ingest throughput (samples/sec) for typical transport batch sizes
//! - Payload parse + ingest latency for one envelope
//! - Analysis latency for recordings of increasing length
//!
//! Run with: cargo bench --bench synchronizer

use chrono::{DateTime, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use swing_daq::analysis::SwingAnalyzer;
use swing_daq::data::synchronizer::StreamSynchronizer;
use swing_daq::mock::MockSwingSource;
use swing_daq::recording::{Recording, SignalArrays};
use swing_daq::session::SwingSession;

fn start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

/// Ingest pre-generated batches into a fresh 400-frame synchronizer.
fn synchronizer_ingest_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("synchronizer_ingest");

    for batch_ms in [50_i64, 100, 250, 500] {
        let mut source = MockSwingSource::starting_at(11, start());
        let batches = MockSwingSource::batches(source.swing(), batch_ms);
        let samples: usize = batches.iter().map(Vec::len).sum();

        group.throughput(Throughput::Elements(samples as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_ms", batch_ms),
            &batches,
            |b, batches| {
                b.iter(|| {
                    let mut sync = StreamSynchronizer::new(400);
                    for batch in batches {
                        black_box(sync.ingest(batch));
                    }
                });
            },
        );
    }

    group.finish();
}

/// Parse one JSON envelope and ingest it through a session.
fn payload_round_trip(c: &mut Criterion) {
    let mut source = MockSwingSource::starting_at(3, start());
    let samples = source.idle(100);
    let message = source.envelope(&samples).to_string();

    c.bench_function("session_ingest_payload_100ms", |b| {
        b.iter(|| {
            let session = SwingSession::new(400, 5, None);
            black_box(session.ingest_payload(message.as_bytes()).unwrap());
        });
    });
}

/// Analyzer latency on recordings of 1, 3 and 10 swings.
fn analysis_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("swing_analysis");

    for swings in [1_usize, 3, 10] {
        let mut source = MockSwingSource::starting_at(5, start());
        let mut sync = StreamSynchronizer::new(400);
        let mut signals = SignalArrays::default();
        for _ in 0..swings {
            sync.ingest_with(&source.swing(), |frame| signals.push(frame));
        }
        let recording = Recording::from_signals(start(), source.clock(), signals);

        group.throughput(Throughput::Elements(recording.sample_count as u64));
        group.bench_with_input(BenchmarkId::new("swings", swings), &recording, |b, rec| {
            let analyzer = SwingAnalyzer::new();
            b.iter(|| black_box(analyzer.analyze(rec)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    synchronizer_ingest_throughput,
    payload_round_trip,
    analysis_latency
);
criterion_main!(benches);
