//! Sustained-burst scenarios for the threaded pipeline
//!
//! Run with: cargo test --test load_testing --release -- --nocapture
//!
//! The long soak is marked #[ignore]; run it explicitly with:
//! cargo test --test load_testing -- --ignored --nocapture

use std::time::{Duration, Instant};
use switchyard::domain::{DiagnosticKind, RecordingDiagnostics, ShapeKind};
use switchyard::extraction::WorkerConfig;
use switchyard::routing::RecordingSink;
use switchyard::{Pipeline, RingBufferConfig};

/// Messages in one device burst
const BURST_MESSAGES: usize = 65_539;
/// Bytes per serial read
const CHUNK_SIZE: usize = 4096;
/// Time between serial reads
const PRODUCER_CADENCE: Duration = Duration::from_millis(4);
/// Minimum time between worker passes, slower than the producer
const WORKER_THROTTLE: Duration = Duration::from_millis(5);

fn burst(messages: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(messages * 18);
    for n in 0..messages {
        bytes.extend_from_slice(format!("Cog{}  msg {n:05}\r\n", n % 8).as_bytes());
    }
    bytes
}

struct LoadRun {
    sink: RecordingSink,
    diagnostics: RecordingDiagnostics,
    elapsed: Duration,
}

fn run_burst(messages: usize, cadence: Duration) -> LoadRun {
    let sink = RecordingSink::new();
    let diagnostics = RecordingDiagnostics::new();
    let mut pipeline = Pipeline::builder(sink.clone(), sink.clone(), diagnostics.clone())
        .ring_buffer(RingBufferConfig::default())
        .worker(WorkerConfig {
            min_pass_interval: WORKER_THROTTLE,
            ..WorkerConfig::default()
        })
        .start()
        .expect("pipeline starts");

    let bytes = burst(messages);
    let start = Instant::now();
    let mut next_read = start;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        assert!(
            pipeline.ingest(chunk).is_accepted(),
            "producer overflowed at {} bytes",
            pipeline.ring_stats().total_appended
        );
        pipeline.pump();
        next_read += cadence;
        if let Some(wait) = next_read.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    while sink.messages().len() < messages && Instant::now() < deadline {
        pipeline.pump_timeout(Duration::from_millis(20));
    }
    pipeline.shutdown().expect("worker stops cleanly");

    LoadRun {
        sink,
        diagnostics,
        elapsed: start.elapsed(),
    }
}

fn assert_lossless(run: &LoadRun, messages: usize) {
    let delivered = run.sink.messages();
    assert_eq!(delivered.len(), messages, "every message delivered");

    for (n, message) in delivered.iter().enumerate() {
        assert_eq!(message.kind(), ShapeKind::UnitLine);
        assert_eq!(message.sequence().into_inner(), n as u64);
        assert_eq!(message.text(), format!("Cog{}  msg {n:05}", n % 8));
    }

    let losses = run.diagnostics.count_where(DiagnosticKind::is_data_loss);
    assert_eq!(losses, 0, "no data-loss diagnostics");
}

#[test]
fn test_burst_with_slow_worker_loses_nothing() {
    let run = run_burst(BURST_MESSAGES, PRODUCER_CADENCE);
    println!(
        "{} messages in {:?} ({:.0} msg/s)",
        BURST_MESSAGES,
        run.elapsed,
        BURST_MESSAGES as f64 / run.elapsed.as_secs_f64()
    );
    assert_lossless(&run, BURST_MESSAGES);
}

#[test]
#[ignore] // Run explicitly with: cargo test --test load_testing test_repeated_bursts -- --ignored
fn test_repeated_bursts() {
    for round in 0..10 {
        let run = run_burst(BURST_MESSAGES, PRODUCER_CADENCE);
        println!("round {round}: {:?}", run.elapsed);
        assert_lossless(&run, BURST_MESSAGES);
    }
}

#[test]
fn test_unpaced_producer_is_bounded_by_ring_capacity() {
    // A producer that never yields still loses nothing while the burst fits
    let messages = 20_000;
    let run = run_burst(messages, Duration::ZERO);
    assert_lossless(&run, messages);
}
