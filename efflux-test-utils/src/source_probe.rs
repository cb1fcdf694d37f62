// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Instrumented cold-source factory.
//!
//! A [`SourceProbe`] scripts the items of a cold producer and counts how
//! often the sharing driver activated it and how many collections are still
//! alive — the observable facts sharing tests assert on ("the upstream was
//! not started", "the upstream was cancelled").

use efflux_core::{EffluxError, StreamItem};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Scripted cold source with activation accounting.
pub struct SourceProbe<T> {
    items: Vec<StreamItem<T>>,
    complete: bool,
    activations: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl<T: Clone + Send + 'static> SourceProbe<T> {
    /// A source that yields `values` and then stays silent forever.
    pub fn values(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: values.into_iter().map(StreamItem::Value).collect(),
            complete: false,
            activations: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A source that yields `values` and then completes.
    pub fn completing(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            complete: true,
            ..Self::values(values)
        }
    }

    /// A source that yields `values` and then fails.
    pub fn failing(values: impl IntoIterator<Item = T>, context: &str) -> Self {
        let mut probe = Self::completing(values);
        probe
            .items
            .push(StreamItem::Error(EffluxError::upstream(context)));
        probe
    }

    /// How often the driver obtained a fresh collection.
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    /// How many collections are currently being consumed.
    pub fn live_collections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Factory to hand to `shared_of` / `state_of`.
    pub fn factory(&self) -> impl FnMut() -> ProbeStream<T> + Send + 'static {
        let items = self.items.clone();
        let complete = self.complete;
        let activations = Arc::clone(&self.activations);
        let live = Arc::clone(&self.live);
        move || {
            activations.fetch_add(1, Ordering::SeqCst);
            let scripted = stream::iter(items.clone());
            let inner: BoxStream<'static, StreamItem<T>> = if complete {
                scripted.boxed()
            } else {
                scripted.chain(stream::pending()).boxed()
            };
            ProbeStream {
                inner,
                _guard: LiveGuard::acquire(Arc::clone(&live)),
            }
        }
    }
}

/// One activation of a [`SourceProbe`]; decrements the live count on drop.
pub struct ProbeStream<T> {
    inner: BoxStream<'static, StreamItem<T>>,
    _guard: LiveGuard,
}

impl<T> Stream for ProbeStream<T> {
    type Item = StreamItem<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
