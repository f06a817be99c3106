//! # Command Queue Benchmark
//!
//! Measures:
//! - raw push + flush cost, no thread hop
//! - fire-and-forget throughput through a live worker
//! - blocking round trip latency (`call_sync`)
//!
//! Run with: `cargo bench --package marshal_core`

#![allow(missing_docs)]
#![allow(dead_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use marshal_core::{CommandQueue, MarshalConfig, Server, ServerProxy};

#[derive(Default)]
struct Accumulator {
    total: u64,
}

impl Server for Accumulator {
    fn init(&mut self) {}
    fn finish(&mut self) {}
    fn step(&mut self, delta: f32) {
        self.total = self.total.wrapping_add(delta.to_bits().into());
    }
    fn sync(&mut self) {}
    fn flush_queries(&mut self) {}
    fn end_sync(&mut self) {}
}

/// Push then flush on one thread: the bookkeeping floor.
fn bench_push_flush_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_push_flush");

    for count in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let queue = CommandQueue::<u64>::new(count);
            let mut target = 0u64;
            b.iter(|| {
                for i in 0..count as u64 {
                    queue.push(move |t: &mut u64| *t = t.wrapping_add(i));
                }
                black_box(queue.flush_all(&mut target))
            });
        });
    }

    group.finish();
}

/// Async calls through a running worker, closed by one sync call.
fn bench_threaded_async_batch(c: &mut Criterion) {
    let proxy = ServerProxy::new(Accumulator::default(), &MarshalConfig::threaded());
    proxy.init().unwrap_or_else(|e| panic!("worker failed to start: {e}"));

    c.bench_function("threaded_1000_async_then_sync", |b| {
        b.iter(|| {
            for i in 0..1000u64 {
                proxy.call(move |s| s.total = s.total.wrapping_add(i));
            }
            black_box(proxy.call_sync(|s| s.total))
        });
    });

    let _ = proxy.finish();
}

/// One blocking round trip per iteration.
fn bench_call_sync_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("call_sync_round_trip");

    for (name, config) in [
        ("threaded", MarshalConfig::threaded()),
        ("inline", MarshalConfig::inline()),
    ] {
        let proxy = ServerProxy::new(Accumulator::default(), &config);
        proxy.init().unwrap_or_else(|e| panic!("proxy failed to start: {e}"));
        group.bench_function(name, |b| {
            b.iter(|| black_box(proxy.call_sync(|s| s.total)));
        });
        let _ = proxy.finish();
    }

    group.finish();
}

/// Full frame: sync, flush, end_sync, step.
fn bench_frame_cycle(c: &mut Criterion) {
    let proxy = ServerProxy::new(Accumulator::default(), &MarshalConfig::threaded());
    proxy.init().unwrap_or_else(|e| panic!("worker failed to start: {e}"));

    c.bench_function("threaded_frame_cycle", |b| {
        b.iter(|| {
            proxy.sync();
            proxy.flush_queries();
            proxy.end_sync();
            proxy.step(black_box(1.0 / 60.0));
        });
    });

    proxy.sync();
    let _ = proxy.finish();
}

criterion_group!(
    benches,
    bench_push_flush_single_thread,
    bench_threaded_async_batch,
    bench_call_sync_round_trip,
    bench_frame_cycle,
);

criterion_main!(benches);
