use chat_relay::broadcast::Broadcaster;
use chat_relay::history::MessageLog;
use chat_relay::metrics::RelayMetrics;
use chat_relay::message::{Message, SharedMessage};
use chat_relay::registry::{ConnectionId, ConnectionRegistry, SessionHandle};
use chrono::NaiveTime;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("failed to build runtime")
}

fn bench_broadcast_fanout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("broadcast_fanout");

    for sessions in [1u64, 16, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(sessions), &sessions, |b, &n| {
            let broadcaster = Broadcaster::new(
                MessageLog::new(Some(1024)),
                ConnectionRegistry::new(),
                Arc::new(RelayMetrics::new()),
            );
            let addr: SocketAddr = "127.0.0.1:9".parse().expect("valid addr");
            let mut receivers: Vec<mpsc::Receiver<SharedMessage>> = Vec::new();
            rt.block_on(async {
                for ordinal in 1..=n {
                    let (tx, rx) = mpsc::channel(4096);
                    let handle = SessionHandle::new(
                        ConnectionId::new(ordinal),
                        addr,
                        tx,
                        CancellationToken::new(),
                    );
                    broadcaster.admit(handle).await;
                    receivers.push(rx);
                }
            });

            b.iter(|| {
                rt.block_on(async {
                    let report = broadcaster.broadcast("Alice: benchmark line").await;
                    black_box(report.delivered);
                });
                for rx in &mut receivers {
                    while rx.try_recv().is_ok() {}
                }
            });
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let time = NaiveTime::from_hms_opt(12, 34, 56).expect("valid time");
    c.bench_function("message_render", |b| {
        b.iter(|| black_box(Message::stamped(black_box("Bob: hello there"), time)));
    });
}

criterion_group!(broadcast_fanout, bench_broadcast_fanout, bench_render);
criterion_main!(broadcast_fanout);
