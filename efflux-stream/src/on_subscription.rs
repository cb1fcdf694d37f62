// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Subscription hook: run an action once, after registration, before any
//! upstream value is delivered.

use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Sink handed to an `on_subscription` action; values pushed here are
/// yielded to the subscriber before any upstream value.
pub struct SubscriptionSink<T> {
    queued: VecDeque<T>,
}

impl<T> SubscriptionSink<T> {
    /// Queue a synthetic value for delivery ahead of the upstream.
    pub fn emit(&mut self, value: T) {
        self.queued.push_back(value);
    }
}

/// Stream returned by [`OnSubscriptionExt::on_subscription`].
pub struct OnSubscription<S: Stream, F> {
    inner: S,
    action: Option<F>,
    queued: VecDeque<S::Item>,
}

impl<S, F> Stream for OnSubscription<S, F>
where
    S: Stream + Unpin,
    S::Item: Unpin,
    F: FnOnce(&mut SubscriptionSink<S::Item>) + Unpin,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
        let this = self.get_mut();
        if let Some(action) = this.action.take() {
            let mut sink = SubscriptionSink {
                queued: std::mem::take(&mut this.queued),
            };
            action(&mut sink);
            this.queued = sink.queued;
        }
        if let Some(value) = this.queued.pop_front() {
            return Poll::Ready(Some(value));
        }
        Pin::new(&mut this.inner).poll_next(cx)
    }
}

/// Extension trait wrapping a subscriber stream with a one-shot hook.
pub trait OnSubscriptionExt: Stream + Sized {
    /// Run `action` exactly once before the first value is drawn.
    ///
    /// The slot registration happened when the subscription was created, so
    /// by the time the action runs the subscriber already counts towards the
    /// subscription-count signal. The action may emit synthetic values
    /// through the [`SubscriptionSink`]; they are delivered before anything
    /// from the wrapped stream. Hooks compose — when wrapping an already
    /// hooked stream, the outer action (and its synthetic values) come
    /// first.
    fn on_subscription<F>(self, action: F) -> OnSubscription<Self, F>
    where
        F: FnOnce(&mut SubscriptionSink<Self::Item>),
    {
        OnSubscription {
            inner: self,
            action: Some(action),
            queued: VecDeque::new(),
        }
    }
}

impl<S: Stream + Sized> OnSubscriptionExt for S {}
