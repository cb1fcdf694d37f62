// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Single-value state stream with distinct-by-equality updates.

use crate::shared_subject::{SharedSubject, SharedSubscription};
use crate::subscription_count::SubscriptionCount;
use crate::BufferOverflow;

/// A hot stream that always holds exactly one current value.
///
/// `StateSubject` is the degenerate shared-stream configuration
/// `replay = 1, extra_buffer = 0, DropOldest` with a mandatory initial
/// value. Updates are distinct-by-equality: setting a value equal to the
/// current one is suppressed, so subscribers only observe transitions.
/// Downstream distinct-until-changed stages can rely on that and skip their
/// own comparison.
///
/// # Example
///
/// ```
/// use efflux_core::StateSubject;
/// use futures::StreamExt;
///
/// # tokio_test::block_on(async {
/// let state = StateSubject::new(0);
/// let mut changes = state.subscribe();
///
/// assert!(!state.set_value(0)); // unchanged, suppressed
/// assert!(state.set_value(1));
///
/// assert_eq!(changes.next().await, Some(0)); // replayed current value
/// assert_eq!(changes.next().await, Some(1));
/// assert_eq!(state.value(), 1);
/// # });
/// ```
pub struct StateSubject<T> {
    shared: SharedSubject<T>,
}

impl<T> Clone for StateSubject<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + PartialEq> StateSubject<T> {
    /// Create a state subject holding `initial`.
    pub fn new(initial: T) -> Self {
        // replay = 1 with an initial value and DropOldest is statically valid.
        Self {
            shared: SharedSubject::new_unchecked(1, 0, BufferOverflow::DropOldest, Some(initial)),
        }
    }

    /// Snapshot of the current value.
    pub fn value(&self) -> T {
        self.shared
            .latest()
            .expect("a state subject always holds its current value")
    }

    /// Update the current value; suppressed when equal to the current one.
    ///
    /// Returns `true` when the value changed and was published.
    pub fn set_value(&self, value: T) -> bool {
        self.shared.try_emit_distinct(value)
    }

    /// Attach a subscriber; it observes the current value first, then every
    /// subsequent transition.
    pub fn subscribe(&self) -> SharedSubscription<T> {
        self.shared.subscribe()
    }

    /// Observable subscriber-count signal.
    pub fn subscription_count(&self) -> SubscriptionCount {
        self.shared.subscription_count()
    }

    /// Current replay window; always the single current value.
    pub fn replay_snapshot(&self) -> Vec<T> {
        self.shared.replay_snapshot()
    }

    /// Restore the initial value as the current one.
    ///
    /// Used by the sharing driver when a start policy decides the retained
    /// state has expired.
    pub fn reset_replay(&self) {
        self.shared.reset_replay()
    }
}
