//! Performance benchmarks for rmq-event
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use rmq_event::{queue_scoped, EventBody, MemoryBroker, MessageBroker};
use tokio::sync::mpsc;

fn bench_body_construction(c: &mut Criterion) {
    c.bench_function("EventBody::new", |b| {
        b.iter(|| EventBody::new("created"));
    });

    c.bench_function("EventBody builder", |b| {
        b.iter(|| {
            EventBody::new("created")
                .with_field("id", 1)
                .with_field("status", "open")
                .with_field("total", 42.5)
        });
    });
}

fn bench_body_wire_format(c: &mut Criterion) {
    let body = EventBody::new("created")
        .with_field("id", 1)
        .with_field("status", "open")
        .with_field("total", 42.5);

    c.bench_function("EventBody encode", |b| {
        b.iter(|| body.encode().unwrap());
    });

    let bytes = body.encode().unwrap();
    c.bench_function("EventBody decode", |b| {
        b.iter(|| EventBody::decode(&bytes).unwrap());
    });
}

fn bench_routing_key(c: &mut Criterion) {
    let routing = queue_scoped("orders");

    c.bench_function("queue_scoped routing key", |b| {
        b.iter(|| routing("created"));
    });
}

fn bench_memory_send_pipeline(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("send_pipeline_throughput");
    for count in [10usize, 100, 1000] {
        group.bench_function(format!("{} bodies", count), |b| {
            b.to_async(&rt).iter(|| async move {
                let broker = MemoryBroker::default();
                let (body_tx, body_rx) = mpsc::channel(count);
                let (confirm_tx, mut confirm_rx) = mpsc::channel(count);

                for i in 0..count {
                    body_tx
                        .send(EventBody::new("created").with_field("id", i as i64))
                        .await
                        .unwrap();
                }
                drop(body_tx);

                broker
                    .send_event_body_stream(body_rx, confirm_tx)
                    .await
                    .unwrap();

                let mut confirmed = 0;
                while confirm_rx.recv().await.is_some() {
                    confirmed += 1;
                }
                assert_eq!(confirmed, count);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_body_construction,
    bench_body_wire_format,
    bench_routing_key,
    bench_memory_send_pipeline,
);
criterion_main!(benches);
