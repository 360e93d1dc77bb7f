//! # Quantum-MQ Benchmarks
//!
//! | Area | Measured |
//! |------|----------|
//! | mq-01 wire | frame encode / decode |
//! | mq-02 registry | serialize / deserialize by type id |
//! | mq-03 pub/sub | in-process broadcast to N subscribers |
//! | mq-04 req/rep | in-process request round trip |

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mq_01_transport::wire::{decode_body, encode_frame, LENGTH_PREFIX_SIZE};
use mq_01_transport::SocketConfig;
use mq_03_pubsub::{Publisher, Subscriber};
use mq_04_reqrep::{Requester, Responder, WorkerDefinition};
use mq_tests::fixtures::{endpoint, registry, Sequenced, Shout, Text, Whisper};
use shared_types::{Frame, MessageTypeId, TransportKind};
use std::time::Duration;
use tokio::runtime::Runtime;

const MAX_FRAME: usize = 16 * 1024 * 1024;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// MQ-01: Wire Format
// ============================================================================

fn bench_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("mq-01-wire");

    for size in [16usize, 1024, 64 * 1024] {
        let frame = Frame::request(MessageTypeId(7), 42, Bytes::from(vec![0xab; size]));
        let mut encoded = BytesMut::new();
        encode_frame(&frame, &mut encoded, MAX_FRAME).unwrap();
        let body = encoded.freeze().slice(LENGTH_PREFIX_SIZE..);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &frame, |b, frame| {
            let mut buf = BytesMut::with_capacity(size + 32);
            b.iter(|| {
                buf.clear();
                encode_frame(black_box(frame), &mut buf, MAX_FRAME).unwrap();
                black_box(buf.len())
            })
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &body, |b, body| {
            b.iter(|| black_box(decode_body(body.clone()).unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// MQ-02: Serialization Registry
// ============================================================================

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("mq-02-registry");
    let registry = registry();

    let text = Text::new("the quick brown fox jumps over the lazy dog");
    let sequenced = Sequenced(123_456_789);
    let json = registry.message_frame(&text).unwrap();
    let binary = registry.message_frame(&sequenced).unwrap();

    group.bench_function("serialize_json", |b| {
        b.iter(|| black_box(registry.serialize(black_box(&text)).unwrap()))
    });
    group.bench_function("serialize_bincode", |b| {
        b.iter(|| black_box(registry.serialize(black_box(&sequenced)).unwrap()))
    });
    group.bench_function("deserialize_json", |b| {
        b.iter(|| black_box(registry.deserialize_frame(black_box(&json)).unwrap()))
    });
    group.bench_function("deserialize_bincode", |b| {
        b.iter(|| black_box(registry.deserialize_frame(black_box(&binary)).unwrap()))
    });

    group.finish();
}

// ============================================================================
// MQ-03: Broadcast Fan-out
// ============================================================================

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("mq-03-broadcast");
    group.measurement_time(Duration::from_secs(5));
    let rt = runtime();

    for fan_out in [1usize, 8, 32] {
        let (publisher, subscribers) = rt.block_on(async {
            let publisher = Publisher::new(registry(), SocketConfig::default());
            let bound = publisher
                .bind(&endpoint(TransportKind::InProc, "bench-broadcast"))
                .await
                .unwrap();
            let mut subscribers = Vec::with_capacity(fan_out);
            for _ in 0..fan_out {
                subscribers.push(
                    Subscriber::connect(&bound, registry(), SocketConfig::default())
                        .await
                        .unwrap(),
                );
            }
            while publisher.connected_count() < fan_out {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            (publisher, subscribers)
        });

        group.throughput(Throughput::Elements(fan_out as u64));
        group.bench_with_input(BenchmarkId::new("in_proc", fan_out), &fan_out, |b, _| {
            b.to_async(&rt).iter(|| async {
                publisher.broadcast(&Sequenced(1)).await.unwrap();
                for subscriber in &subscribers {
                    black_box(subscriber.receive(Duration::from_secs(1)).await.unwrap());
                }
            })
        });
    }

    group.finish();
}

// ============================================================================
// MQ-04: Request Round Trip
// ============================================================================

fn bench_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("mq-04-request");
    let rt = runtime();

    let (_responder, requester) = rt.block_on(async {
        let responder = Responder::new(
            registry(),
            WorkerDefinition::new().route(|whisper: &Whisper| {
                Ok(Shout {
                    body: whisper.body.clone(),
                    served_by: String::new(),
                })
            }),
            SocketConfig::default(),
        );
        let bound = responder
            .bind(&endpoint(TransportKind::InProc, "bench-request"))
            .await
            .unwrap();
        let requester = Requester::connect(&bound, registry(), SocketConfig::default())
            .await
            .unwrap();
        (responder, requester)
    });

    let whisper = Whisper {
        body: "ping".to_string(),
    };
    group.bench_function("in_proc_round_trip", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                requester
                    .request(&whisper, Duration::from_secs(1))
                    .await
                    .unwrap(),
            )
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_wire,
    bench_registry,
    bench_broadcast,
    bench_request
);
criterion_main!(benches);
