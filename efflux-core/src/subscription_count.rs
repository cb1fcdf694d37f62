// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Observable subscriber-count signal.
//!
//! A single atomic counter with a change-notification primitive. Start
//! policies watch this signal to decide when to start or stop the upstream
//! producer. Readers get distinct-until-changed semantics by construction:
//! [`SubscriptionCount::changed`] only resolves once the value differs from
//! the one the caller last observed.

use event_listener::Event;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Cloneable handle to the subscriber count of one shared stream.
///
/// The count is updated atomically with every slot allocation and free.
/// Polling readers see eventually-consistent values; no precise
/// happens-before is promised beyond "a change eventually wakes waiters".
#[derive(Clone, Debug)]
pub struct SubscriptionCount {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    value: AtomicUsize,
    event: Event,
}

impl SubscriptionCount {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                value: AtomicUsize::new(0),
                event: Event::new(),
            }),
        }
    }

    /// Current number of active subscribers.
    pub fn get(&self) -> usize {
        self.inner.value.load(Ordering::Acquire)
    }

    /// Store a new count, waking all waiters when it actually changed.
    pub(crate) fn set(&self, count: usize) {
        let previous = self.inner.value.swap(count, Ordering::AcqRel);
        if previous != count {
            self.inner.event.notify(usize::MAX);
        }
    }

    /// Wait until the count differs from `seen` and return the new value.
    ///
    /// Returns immediately if the current value already differs. Several
    /// changes may collapse into one observation; only the latest value is
    /// reported, which is exactly what latest-wins start policies need.
    pub async fn changed(&self, seen: usize) -> usize {
        loop {
            let current = self.get();
            if current != seen {
                return current;
            }
            let listener = self.inner.event.listen();

            // Re-check after registering to close the race with a concurrent
            // set() between the first load and listen().
            let current = self.get();
            if current != seen {
                return current;
            }
            listener.await;
        }
    }
}
