// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use futures::stream::Stream;
use futures::task::noop_waker;
use futures::StreamExt;
use std::fmt::Debug;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::sleep;

/// Panic if `stream` emits anything within `timeout_ms` milliseconds.
pub async fn assert_no_element_emitted<S, T>(stream: &mut S, timeout_ms: u64)
where
    S: Stream<Item = T> + Unpin,
    T: Debug,
{
    tokio::select! {
        value = stream.next() => {
            panic!("unexpected element emitted: {value:?}, expected no output");
        }
        () = sleep(Duration::from_millis(timeout_ms)) => {}
    }
}

/// Expect the next item of `stream` to equal `expected`.
pub async fn expect_next_value<S, T>(stream: &mut S, expected: T)
where
    S: Stream<Item = T> + Unpin,
    T: PartialEq + Debug,
{
    let item = stream.next().await.expect("expected next item");
    assert_eq!(item, expected);
}

/// Collect exactly `n` items from `stream`.
pub async fn collect_n<S, T>(stream: &mut S, n: usize) -> Vec<T>
where
    S: Stream<Item = T> + Unpin,
{
    let mut collected = Vec::with_capacity(n);
    for _ in 0..n {
        collected.push(stream.next().await.expect("stream ended early"));
    }
    collected
}

/// Poll out every item the stream can yield without waiting.
pub fn drain_ready<S, T>(stream: &mut S) -> Vec<T>
where
    S: Stream<Item = T> + Unpin,
{
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    let mut drained = Vec::new();
    while let Poll::Ready(Some(value)) = Pin::new(&mut *stream).poll_next(&mut cx) {
        drained.push(value);
    }
    drained
}

/// Yield to the runtime until background tasks had a chance to run.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
