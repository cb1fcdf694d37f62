// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use efflux_core::{BufferOverflow, SharedSubject};
use futures::StreamExt;

fn emit_without_subscribers(c: &mut Criterion) {
    let subject = SharedSubject::new(1, 64, BufferOverflow::DropOldest).unwrap();
    c.bench_function("try_emit/no_subscribers", |b| {
        b.iter(|| subject.try_emit(black_box(1u64)))
    });
}

fn emit_with_subscribers(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap();

    for subscribers in [1usize, 4] {
        c.bench_function(&format!("emit_collect/{subscribers}_subscribers"), |b| {
            b.to_async(&runtime).iter(|| async {
                let subject = SharedSubject::new(0, 64, BufferOverflow::Suspend).unwrap();
                let mut consumers = Vec::new();
                for _ in 0..subscribers {
                    let mut subscription = subject.subscribe();
                    consumers.push(tokio::spawn(async move {
                        for _ in 0..256 {
                            black_box(subscription.next().await);
                        }
                    }));
                }
                for value in 0u64..256 {
                    subject.emit(value).await;
                }
                for consumer in consumers {
                    consumer.await.unwrap();
                }
            })
        });
    }
}

criterion_group!(benches, emit_without_subscribers, emit_with_subscribers);
criterion_main!(benches);
