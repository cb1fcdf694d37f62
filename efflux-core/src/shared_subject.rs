// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Hot, multicast, replay-capable value stream.
//!
//! [`SharedSubject`] fans every accepted value out to all current
//! subscribers, retains the most recent `replay` values for late
//! subscribers, buffers up to `extra_buffer` additional values for slow
//! ones, and — under the [`Suspend`](crate::BufferOverflow::Suspend)
//! strategy — parks producers in-band when the buffer is full.
//!
//! ## Characteristics
//!
//! - **Hot**: values are accepted independently of subscribers; a subscriber
//!   attached at time *t* observes the replay window as of *t*, then every
//!   value accepted afterwards, in order and without gaps (documented losses
//!   under `DropOldest` aside).
//! - **Never completes, never fails**: subscriber streams yield `T` forever.
//!   Producers wanting failure semantics materialize errors as values before
//!   sharing.
//! - **Rendezvous mode**: with `replay + extra_buffer == 0` every `emit`
//!   suspends until a subscriber takes the value directly from the parked
//!   producer.
//!
//! ## Internals
//!
//! All per-instance state lives under one `parking_lot::Mutex`: the circular
//! buffer of values and parked emitter records, the replay index, the
//! minimum subscriber cursor, and the slot registry. Every mutating path
//! gathers the wakeups it caused into a local list inside the lock and fires
//! them after release — the deadlock-avoidance contract for resuming
//! cooperative tasks.

use crate::ring_buffer::{EmitterSlot, Entry, RingBuffer};
use crate::slots::{SlotId, SlotRegistry};
use crate::subscription_count::SubscriptionCount;
use crate::{BufferOverflow, EffluxError, Result};
use futures::Stream;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Wakeups are collected under the lock and fired after it is released.
type Wakeups = Vec<Waker>;

fn fire(wakeups: Wakeups) {
    for waker in wakeups {
        waker.wake();
    }
}

/// A hot multicast subject with a configurable replay window and buffer.
///
/// Cloning the subject clones the handle; all clones share one stream state.
/// See the [module documentation](self) for semantics.
pub struct SharedSubject<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SharedSubject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T> {
    state: Mutex<State<T>>,
    count: SubscriptionCount,
}

struct State<T> {
    /// Configured replay capacity.
    replay: usize,
    /// Configured total capacity, `replay + extra_buffer` (saturating).
    buffer_capacity: usize,
    overflow: BufferOverflow,
    /// Re-installed as the sole replay content by `reset_replay`.
    initial: Option<T>,

    buffer: Option<RingBuffer<T>>,
    /// Smallest logical index a new subscriber sees on attach.
    replay_index: u64,
    /// Smallest cursor among active subscribers; tracks the buffer end when
    /// there are none.
    min_collector_index: u64,
    /// Buffered values, both inside the replay window and beyond it.
    buffer_size: usize,
    /// Parked emitter records past the buffered values.
    queue_size: usize,
    slots: SlotRegistry,
    /// True while the replay window is exactly the configured initial value;
    /// makes `reset_replay` idempotent without requiring `T: PartialEq`.
    replay_is_initial: bool,
}

impl<T: Clone> SharedSubject<T> {
    /// Create a subject with `replay` retained values, `extra_buffer`
    /// additional slots for slow subscribers, and the given overflow
    /// strategy.
    ///
    /// # Errors
    ///
    /// Returns [`EffluxError::OverflowRequiresCapacity`] when a dropping
    /// strategy is combined with zero total capacity.
    pub fn new(replay: usize, extra_buffer: usize, overflow: BufferOverflow) -> Result<Self> {
        Self::build(replay, extra_buffer, overflow, None)
    }

    /// Like [`new`](Self::new), seeding the replay window with `initial`.
    ///
    /// # Errors
    ///
    /// Additionally returns [`EffluxError::InitialValueWithoutReplay`] when
    /// `replay == 0`.
    pub fn with_initial(
        replay: usize,
        extra_buffer: usize,
        overflow: BufferOverflow,
        initial: T,
    ) -> Result<Self> {
        Self::build(replay, extra_buffer, overflow, Some(initial))
    }

    fn build(
        replay: usize,
        extra_buffer: usize,
        overflow: BufferOverflow,
        initial: Option<T>,
    ) -> Result<Self> {
        if initial.is_some() && replay == 0 {
            return Err(EffluxError::InitialValueWithoutReplay);
        }
        if overflow != BufferOverflow::Suspend && replay.saturating_add(extra_buffer) == 0 {
            return Err(EffluxError::OverflowRequiresCapacity { strategy: overflow });
        }
        Ok(Self::new_unchecked(replay, extra_buffer, overflow, initial))
    }

    /// Construction path for statically valid configurations.
    pub(crate) fn new_unchecked(
        replay: usize,
        extra_buffer: usize,
        overflow: BufferOverflow,
        initial: Option<T>,
    ) -> Self {
        let mut state = State {
            replay,
            buffer_capacity: replay.saturating_add(extra_buffer),
            overflow,
            initial: initial.clone(),
            buffer: None,
            replay_index: 0,
            min_collector_index: 0,
            buffer_size: 0,
            queue_size: 0,
            slots: SlotRegistry::new(),
            replay_is_initial: false,
        };
        if let Some(value) = initial {
            state.enqueue_value(value);
            state.buffer_size = 1;
            state.min_collector_index = 1;
            state.replay_is_initial = true;
        }
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                count: SubscriptionCount::new(),
            }),
        }
    }

    /// Emit a value without suspending.
    ///
    /// Returns `true` when the value was accepted (possibly by dropping the
    /// oldest buffered value, or by being dropped itself under `DropLatest`
    /// — both count as accepted). Returns `false` only under the `Suspend`
    /// strategy with a full buffer, and always in rendezvous mode.
    pub fn try_emit(&self, value: T) -> bool {
        let mut wakeups = Wakeups::new();
        let emitted = {
            let mut state = self.inner.state.lock();
            match state.try_emit_locked(value) {
                Ok(()) => {
                    state.find_slots_to_resume(&mut wakeups);
                    true
                }
                Err(_) => false,
            }
        };
        fire(wakeups);
        emitted
    }

    /// Emit a value, suspending while the buffer has no room for it.
    ///
    /// The parked producer is stored in-band at its logical index; dropping
    /// the returned future before resumption removes it again (a tombstone
    /// is left when it sits in the middle of the queue). In rendezvous mode
    /// the producer always parks and the value is handed directly to the
    /// first subscriber positioned at it.
    pub async fn emit(&self, value: T) {
        if let Some(waiter) = self.try_emit_or_enqueue(value) {
            waiter.await;
        }
    }

    fn try_emit_or_enqueue(&self, value: T) -> Option<EmitterWait<T>> {
        let mut wakeups = Wakeups::new();
        let waiter = {
            let mut state = self.inner.state.lock();
            match state.try_emit_locked(value) {
                Ok(()) => {
                    state.find_slots_to_resume(&mut wakeups);
                    None
                }
                Err(value) => {
                    let index = state.head() + state.total_size() as u64;
                    let emitter = Arc::new(EmitterSlot::new(index, value));
                    state.enqueue(Entry::Emitter(emitter.clone()));
                    state.queue_size += 1;
                    // The queue head just became peekable for rendezvous takers.
                    if state.rendezvous() {
                        state.find_slots_to_resume(&mut wakeups);
                    }
                    Some(EmitterWait {
                        subject: self.clone(),
                        emitter,
                    })
                }
            }
        };
        fire(wakeups);
        waiter
    }

    /// Attach a subscriber positioned at the start of the replay window.
    ///
    /// The slot is registered (and the subscription count bumped) before
    /// this call returns; values are pulled through the returned stream,
    /// which never terminates. Dropping it frees the slot and may resume
    /// parked producers.
    pub fn subscribe(&self) -> SharedSubscription<T> {
        let id = {
            let mut state = self.inner.state.lock();
            let cursor = state.replay_index;
            if cursor < state.min_collector_index {
                state.min_collector_index = cursor;
            }
            let id = state.slots.allocate(cursor);
            self.inner.count.set(state.slots.active());
            id
        };
        SharedSubscription {
            subject: self.clone(),
            id,
        }
    }

    /// Copy of the current replay window, oldest first.
    pub fn replay_snapshot(&self) -> Vec<T> {
        let state = self.inner.state.lock();
        let mut snapshot = Vec::with_capacity(state.replay_size());
        let mut index = state.replay_index;
        while index < state.buffer_end() {
            if let Some(Entry::Value(value)) = state.buffer.as_ref().map(|b| b.get(index)) {
                snapshot.push(value.clone());
            }
            index += 1;
        }
        snapshot
    }

    /// Observable subscriber-count signal of this subject.
    pub fn subscription_count(&self) -> SubscriptionCount {
        self.inner.count.clone()
    }

    /// Erase the replay window for future subscribers.
    ///
    /// Buffered values already visible to slow subscribers stay reachable
    /// for them; only the window presented to new subscribers is cleared.
    /// With a configured initial value the window is rebuilt to exactly one
    /// copy of it instead. Idempotent.
    pub fn reset_replay(&self) {
        let mut wakeups = Wakeups::new();
        {
            let mut state = self.inner.state.lock();
            state.reset_replay(&mut wakeups);
        }
        fire(wakeups);
    }

    /// Equality-gated `try_emit`: suppressed when the incoming value equals
    /// the most recent replay entry. Backs `StateSubject::set_value`.
    pub(crate) fn try_emit_distinct(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        let mut wakeups = Wakeups::new();
        let emitted = {
            let mut state = self.inner.state.lock();
            if state.latest_equals(&value) {
                false
            } else {
                match state.try_emit_locked(value) {
                    Ok(()) => {
                        state.find_slots_to_resume(&mut wakeups);
                        true
                    }
                    Err(_) => false,
                }
            }
        };
        fire(wakeups);
        emitted
    }

    /// Most recent replay entry, if the window is non-empty.
    pub(crate) fn latest(&self) -> Option<T> {
        let state = self.inner.state.lock();
        if state.replay_size() == 0 {
            return None;
        }
        match state.buffer.as_ref()?.get(state.buffer_end() - 1) {
            Entry::Value(value) => Some(value.clone()),
            _ => None,
        }
    }
}

impl<T> SharedSubject<T> {
    /// Remove a cancelled emitter from the queue.
    ///
    /// No-op when the record was already resumed or compacted away. A record
    /// in the middle of the queue is tombstoned in place; trailing
    /// tombstones are stripped.
    fn cancel_emitter(&self, emitter: &Arc<EmitterSlot<T>>) {
        let mut state = self.inner.state.lock();
        let index = {
            let record = emitter.state.lock();
            if record.resumed {
                return;
            }
            record.index
        };
        if index < state.head() {
            return;
        }
        let entry_matches = matches!(
            state.buffer.as_ref().map(|b| b.get(index)),
            Some(Entry::Emitter(current)) if Arc::ptr_eq(current, emitter)
        );
        if !entry_matches {
            return;
        }
        if let Some(buffer) = state.buffer.as_mut() {
            buffer.set(index, Entry::Tombstone);
        }
        state.cleanup_tail();
    }
}

/// Future of a parked `emit` call; resumption is delivered by the subject's
/// cursor-advance logic when a subscriber frees space.
struct EmitterWait<T> {
    subject: SharedSubject<T>,
    emitter: Arc<EmitterSlot<T>>,
}

impl<T> Future for EmitterWait<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut record = self.emitter.state.lock();
        if record.resumed {
            Poll::Ready(())
        } else {
            record.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl<T> Drop for EmitterWait<T> {
    fn drop(&mut self) {
        // Fast path without the subject lock; resumption is final.
        if self.emitter.state.lock().resumed {
            return;
        }
        self.subject.cancel_emitter(&self.emitter);
    }
}

/// One subscriber's view of a [`SharedSubject`].
///
/// Yields every value from its attach position onwards and never returns
/// `None`. Dropping the subscription frees its slot; cancellation is
/// observed between deliveries.
pub struct SharedSubscription<T> {
    subject: SharedSubject<T>,
    id: SlotId,
}

enum Step<T> {
    Value(T),
    Skip,
    Parked,
}

impl<T: Clone> Stream for SharedSubscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        loop {
            let mut wakeups = Wakeups::new();
            let step = {
                let mut state = this.subject.inner.state.lock();
                let Some(cursor) = state.slots.slot(this.id).cursor else {
                    return Poll::Ready(None);
                };
                match state.try_peek(cursor) {
                    Some(index) => {
                        let peeked = state.peeked_value(index);
                        state.slots.slot_mut(this.id).cursor = Some(index + 1);
                        state.update_collector_index(cursor, &mut wakeups);
                        match peeked {
                            Some(value) => Step::Value(value),
                            // A cancelled rendezvous emitter left a tombstone
                            // at the peeked index; step over it and retry.
                            None => Step::Skip,
                        }
                    }
                    None => {
                        state.slots.slot_mut(this.id).waker = Some(cx.waker().clone());
                        Step::Parked
                    }
                }
            };
            fire(wakeups);
            match step {
                Step::Value(value) => return Poll::Ready(Some(value)),
                Step::Skip => continue,
                Step::Parked => return Poll::Pending,
            }
        }
    }
}

impl<T> Drop for SharedSubscription<T> {
    fn drop(&mut self) {
        let mut wakeups = Wakeups::new();
        {
            let mut state = self.subject.inner.state.lock();
            if let Some(old_cursor) = state.slots.free(self.id) {
                state.update_collector_index(old_cursor, &mut wakeups);
                self.subject.inner.count.set(state.slots.active());
            }
        }
        fire(wakeups);
    }
}

impl<T> State<T> {
    fn head(&self) -> u64 {
        self.min_collector_index.min(self.replay_index)
    }

    fn total_size(&self) -> usize {
        self.buffer_size + self.queue_size
    }

    fn buffer_end(&self) -> u64 {
        self.head() + self.buffer_size as u64
    }

    fn queue_end(&self) -> u64 {
        self.head() + self.total_size() as u64
    }

    fn replay_size(&self) -> usize {
        self.buffer_end().saturating_sub(self.replay_index) as usize
    }

    fn rendezvous(&self) -> bool {
        self.buffer_capacity == 0
    }

    fn enqueue(&mut self, entry: Entry<T>) {
        let head = self.head();
        let total = self.total_size();
        let buffer = self.buffer.get_or_insert_with(|| RingBuffer::new(2));
        if total >= buffer.len() {
            buffer.grow(head, total);
        }
        buffer.set(head + total as u64, entry);
    }

    fn enqueue_value(&mut self, value: T) {
        self.replay_is_initial = false;
        self.enqueue(Entry::Value(value));
    }

    /// Accept a value or hand it back for suspension.
    fn try_emit_locked(&mut self, value: T) -> std::result::Result<(), T> {
        // Rendezvous: a value is only ever handed to a waiting taker, so
        // emitters always park, subscribers or not.
        if self.rendezvous() {
            return Err(value);
        }
        if self.slots.active() == 0 {
            self.emit_without_collectors(value);
            return Ok(());
        }
        if self.buffer_size >= self.buffer_capacity
            && self.min_collector_index <= self.replay_index
        {
            match self.overflow {
                BufferOverflow::Suspend => return Err(value),
                BufferOverflow::DropLatest => return Ok(()),
                BufferOverflow::DropOldest => {}
            }
        }
        self.enqueue_value(value);
        self.buffer_size += 1;
        if self.buffer_size > self.buffer_capacity {
            self.drop_oldest();
        }
        if self.replay_size() > self.replay {
            self.update_buffer(
                self.replay_index + 1,
                self.min_collector_index,
                self.buffer_end(),
                self.queue_end(),
            );
        }
        Ok(())
    }

    /// Without subscribers only the replay window is maintained.
    fn emit_without_collectors(&mut self, value: T) {
        if self.replay == 0 {
            return;
        }
        self.enqueue_value(value);
        self.buffer_size += 1;
        if self.buffer_size > self.replay {
            self.drop_oldest();
        }
        // Default position for the next subscriber.
        self.min_collector_index = self.head() + self.buffer_size as u64;
    }

    fn drop_oldest(&mut self) {
        let head = self.head();
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear(head);
        }
        self.buffer_size -= 1;
        let new_head = head + 1;
        if self.replay_index < new_head {
            self.replay_index = new_head;
        }
        if self.min_collector_index < new_head {
            // Slow subscribers have missed the dropped value; snap them up.
            for id in 0..self.slots.len() {
                let slot = self.slots.slot_mut(id);
                if let Some(cursor) = slot.cursor {
                    if cursor < new_head {
                        slot.cursor = Some(new_head);
                    }
                }
            }
            self.min_collector_index = new_head;
        }
    }

    /// Index the subscriber at `cursor` may read, if any.
    fn try_peek(&self, cursor: u64) -> Option<u64> {
        if cursor < self.buffer_end() {
            return Some(cursor);
        }
        if !self.rendezvous() {
            return None;
        }
        // Rendezvous reads the first parked emitter only, never look-ahead.
        if cursor > self.head() {
            return None;
        }
        if self.queue_size == 0 {
            return None;
        }
        Some(cursor)
    }

    /// Value at a peekable index, dereferencing parked emitters. `None` for
    /// a tombstone (possible transiently in rendezvous mode).
    fn peeked_value(&self, index: u64) -> Option<T>
    where
        T: Clone,
    {
        match self.buffer.as_ref().map(|buffer| buffer.get(index)) {
            Some(Entry::Value(value)) => Some(value.clone()),
            Some(Entry::Emitter(emitter)) => emitter.state.lock().value.clone(),
            _ => None,
        }
    }

    /// Collect wakers of parked subscribers that can now peek a value.
    fn find_slots_to_resume(&mut self, wakeups: &mut Wakeups) {
        for id in 0..self.slots.len() {
            let peekable = {
                let slot = self.slots.slot(id);
                match (slot.cursor, slot.waker.is_some()) {
                    (Some(cursor), true) => self.try_peek(cursor).is_some(),
                    _ => false,
                }
            };
            if peekable {
                if let Some(waker) = self.slots.slot_mut(id).waker.take() {
                    wakeups.push(waker);
                }
            }
        }
    }

    /// Recompute the minimum collector index after a cursor advanced past
    /// `old_cursor` (or its slot was freed), resuming as many parked
    /// producers as the freed space admits, in FIFO logical-index order.
    fn update_collector_index(&mut self, old_cursor: u64, wakeups: &mut Wakeups) {
        if old_cursor > self.min_collector_index {
            return;
        }
        let head = self.head();
        let mut new_min = head + self.buffer_size as u64;
        if self.rendezvous() && self.queue_size > 0 {
            // Keep the rendezvous slot for the queued emitter reachable.
            new_min += 1;
        }
        for id in 0..self.slots.len() {
            if let Some(cursor) = self.slots.slot(id).cursor {
                if cursor < new_min {
                    new_min = cursor;
                }
            }
        }
        if new_min <= self.min_collector_index {
            return;
        }

        let mut new_buffer_end = self.buffer_end();
        let new_queue_end = new_buffer_end + self.queue_size as u64;
        let max_resume = if self.slots.active() > 0 {
            let headroom = self.buffer_capacity as i64 - (new_buffer_end as i64 - new_min as i64);
            (self.queue_size as i64).min(headroom)
        } else {
            self.queue_size as i64
        };
        let mut resumed = 0i64;
        if max_resume > 0 {
            if let Some(buffer) = self.buffer.as_mut() {
                let mut index = new_buffer_end;
                while index < new_queue_end && resumed < max_resume {
                    // Tombstones of cancelled emitters are skipped in place.
                    if matches!(buffer.get(index), Entry::Emitter(_)) {
                        if let Entry::Emitter(emitter) = buffer.take(index) {
                            let value = {
                                let mut record = emitter.state.lock();
                                record.resumed = true;
                                if let Some(waker) = record.waker.take() {
                                    wakeups.push(waker);
                                }
                                record.value.take()
                            };
                            buffer.set(index, Entry::Tombstone);
                            let entry = match value {
                                Some(value) => Entry::Value(value),
                                None => Entry::Tombstone,
                            };
                            buffer.set(new_buffer_end, entry);
                            new_buffer_end += 1;
                            resumed += 1;
                        }
                    }
                    index += 1;
                }
            }
        }
        if resumed > 0 {
            self.replay_is_initial = false;
        }

        let new_buffer_size = (new_buffer_end - head) as usize;
        let capped = self.replay.min(new_buffer_size) as u64;
        let mut new_replay = self.replay_index.max(new_buffer_end - capped);
        if self.rendezvous() && new_replay < new_queue_end {
            let tombstoned = matches!(
                self.buffer.as_ref().map(|b| b.get(new_replay)),
                Some(Entry::Tombstone)
            );
            if tombstoned {
                new_buffer_end += 1;
                new_replay += 1;
            }
        }

        self.update_buffer(new_replay, new_min, new_buffer_end, new_queue_end);
        self.cleanup_tail();
        if resumed > 0 {
            self.find_slots_to_resume(wakeups);
        }
    }

    /// Commit new indices and null out entries that fell behind the head.
    fn update_buffer(
        &mut self,
        new_replay: u64,
        new_min: u64,
        new_buffer_end: u64,
        new_queue_end: u64,
    ) {
        let old_head = self.head();
        let new_head = new_min.min(new_replay);
        debug_assert!(new_head >= old_head);
        if let Some(buffer) = self.buffer.as_mut() {
            let mut index = old_head;
            while index < new_head {
                buffer.clear(index);
                index += 1;
            }
        }
        self.replay_index = new_replay;
        self.min_collector_index = new_min;
        self.buffer_size = (new_buffer_end - new_head) as usize;
        self.queue_size = (new_queue_end - new_buffer_end) as usize;
    }

    /// Strip trailing tombstones from the queue. Rendezvous mode keeps at
    /// least one queued record so the handoff slot stays observable.
    fn cleanup_tail(&mut self) {
        if self.rendezvous() && self.queue_size <= 1 {
            return;
        }
        while self.queue_size > 0 {
            let tail = self.head() + self.total_size() as u64 - 1;
            let is_tombstone = matches!(
                self.buffer.as_ref().map(|b| b.get(tail)),
                Some(Entry::Tombstone)
            );
            if !is_tombstone {
                break;
            }
            if let Some(buffer) = self.buffer.as_mut() {
                buffer.clear(tail);
            }
            self.queue_size -= 1;
        }
    }

    fn latest_equals(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        if self.replay_size() == 0 {
            return false;
        }
        matches!(
            self.buffer.as_ref().map(|b| b.get(self.buffer_end() - 1)),
            Some(Entry::Value(current)) if current == value
        )
    }

    fn reset_replay(&mut self, wakeups: &mut Wakeups)
    where
        T: Clone,
    {
        match self.initial.clone() {
            None => {
                if self.replay_size() == 0 {
                    return;
                }
                self.update_buffer(
                    self.buffer_end(),
                    self.min_collector_index,
                    self.buffer_end(),
                    self.queue_end(),
                );
            }
            Some(initial) => {
                if self.replay_is_initial {
                    return;
                }
                self.update_buffer(
                    self.buffer_end(),
                    self.min_collector_index,
                    self.buffer_end(),
                    self.queue_end(),
                );
                self.insert_replay_initial(initial);
                self.replay_is_initial = true;
                self.find_slots_to_resume(wakeups);
            }
        }
    }

    /// Place the initial value as the new replay content, ahead of any
    /// queued emitters (which shift one slot right, indices rewritten).
    ///
    /// The insertion itself never suspends and is not counted against the
    /// capacity for suspension purposes; only `DropOldest` reacts to the
    /// transient excess, which may advance slow subscribers.
    fn insert_replay_initial(&mut self, value: T) {
        let head = self.head();
        let total = self.total_size();
        let insert_at = head + self.buffer_size as u64;
        let queue_end = head + total as u64;
        let buffer = self.buffer.get_or_insert_with(|| RingBuffer::new(2));
        if total >= buffer.len() {
            buffer.grow(head, total);
        }
        let mut index = queue_end;
        while index > insert_at {
            let entry = buffer.take(index - 1);
            if let Entry::Emitter(emitter) = &entry {
                emitter.state.lock().index += 1;
            }
            buffer.set(index, entry);
            index -= 1;
        }
        buffer.set(insert_at, Entry::Value(value));
        self.buffer_size += 1;
        if matches!(self.overflow, BufferOverflow::DropOldest) {
            while self.buffer_size > self.buffer_capacity {
                self.drop_oldest();
            }
        }
    }
}

#[cfg(test)]
impl<T> SharedSubject<T> {
    /// Check the structural invariants of the locked state.
    fn assert_invariants(&self) {
        let state = self.inner.state.lock();
        assert!(state.replay_size() <= state.replay, "replay window overflow");
        assert!(
            state.replay_size() <= state.buffer_size,
            "replay window outside buffered values"
        );
        assert!(state.min_collector_index <= state.buffer_end());
        assert!(state.replay_index <= state.buffer_end());

        let min_cursor = (0..state.slots.len())
            .filter_map(|id| state.slots.slot(id).cursor)
            .min();
        match min_cursor {
            Some(min) => assert_eq!(state.min_collector_index, min),
            None if state.queue_size == 0 => {
                assert_eq!(state.min_collector_index, state.buffer_end());
            }
            None => assert!(state.min_collector_index <= state.buffer_end()),
        }
        for id in 0..state.slots.len() {
            if let Some(cursor) = state.slots.slot(id).cursor {
                assert!(cursor >= state.head());
                assert!(cursor <= state.buffer_end());
            }
        }
        match &state.buffer {
            Some(buffer) => {
                assert!(buffer.len().is_power_of_two());
                assert!(buffer.len() >= state.total_size());
            }
            None => assert_eq!(state.total_size(), 0),
        }
    }

    fn debug_indices(&self) -> (u64, u64, usize, usize) {
        let state = self.inner.state.lock();
        (
            state.replay_index,
            state.min_collector_index,
            state.buffer_size,
            state.queue_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker;
    use proptest::prelude::*;

    fn poll_once<T: Clone>(subscription: &mut SharedSubscription<T>) -> Poll<Option<T>> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        Pin::new(subscription).poll_next(&mut cx)
    }

    #[derive(Debug, Clone)]
    enum Op {
        TryEmit(u32),
        Subscribe,
        DropSubscriber(usize),
        Take(usize),
        Reset,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..100).prop_map(Op::TryEmit),
            Just(Op::Subscribe),
            (0usize..4).prop_map(Op::DropSubscriber),
            (0usize..4).prop_map(Op::Take),
            Just(Op::Reset),
        ]
    }

    proptest! {
        #[test]
        fn invariants_hold_under_arbitrary_op_sequences(
            replay in 0usize..4,
            extra in 0usize..4,
            overflow_pick in 0u8..3,
            seed_initial in proptest::bool::ANY,
            ops in proptest::collection::vec(op_strategy(), 1..64),
        ) {
            let overflow = match overflow_pick {
                0 => BufferOverflow::Suspend,
                1 => BufferOverflow::DropOldest,
                _ => BufferOverflow::DropLatest,
            };
            prop_assume!(overflow == BufferOverflow::Suspend || replay + extra > 0);
            prop_assume!(!seed_initial || replay > 0);

            let subject = if seed_initial {
                SharedSubject::with_initial(replay, extra, overflow, 0u32).unwrap()
            } else {
                SharedSubject::new(replay, extra, overflow).unwrap()
            };
            subject.assert_invariants();

            let mut subscriptions: Vec<Option<SharedSubscription<u32>>> = Vec::new();
            for op in ops {
                match op {
                    Op::TryEmit(value) => {
                        subject.try_emit(value);
                    }
                    Op::Subscribe => subscriptions.push(Some(subject.subscribe())),
                    Op::DropSubscriber(pick) => {
                        if let Some(entry) = subscriptions.get_mut(pick) {
                            entry.take();
                        }
                    }
                    Op::Take(pick) => {
                        if let Some(Some(subscription)) = subscriptions.get_mut(pick) {
                            let _ = poll_once(subscription);
                        }
                    }
                    Op::Reset => subject.reset_replay(),
                }
                subject.assert_invariants();
            }
        }
    }

    #[test]
    fn reset_replay_is_idempotent() {
        let subject = SharedSubject::new(2, 1, BufferOverflow::Suspend).unwrap();
        assert!(subject.try_emit(1));
        assert!(subject.try_emit(2));
        assert!(subject.try_emit(3));

        subject.reset_replay();
        let first = subject.debug_indices();
        let first_snapshot = subject.replay_snapshot();

        subject.reset_replay();
        assert_eq!(subject.debug_indices(), first);
        assert_eq!(subject.replay_snapshot(), first_snapshot);
        assert!(first_snapshot.is_empty());
    }

    #[test]
    fn reset_replay_restores_initial_value_once() {
        let subject = SharedSubject::with_initial(1, 0, BufferOverflow::DropOldest, 0).unwrap();
        assert!(subject.try_emit(5));
        assert_eq!(subject.replay_snapshot(), vec![5]);

        subject.reset_replay();
        assert_eq!(subject.replay_snapshot(), vec![0]);
        let after_first = subject.debug_indices();

        subject.reset_replay();
        assert_eq!(subject.debug_indices(), after_first);
        assert_eq!(subject.replay_snapshot(), vec![0]);
    }

    #[test]
    fn slow_subscriber_is_snapped_past_dropped_values() {
        let subject = SharedSubject::new(0, 2, BufferOverflow::DropOldest).unwrap();
        let mut slow = subject.subscribe();

        for value in 0..10 {
            assert!(subject.try_emit(value));
        }
        subject.assert_invariants();

        assert_eq!(poll_once(&mut slow), Poll::Ready(Some(8)));
        assert_eq!(poll_once(&mut slow), Poll::Ready(Some(9)));
        assert!(poll_once(&mut slow).is_pending());
    }

    #[tokio::test]
    async fn cancelled_emitter_is_tombstoned_and_skipped() {
        use futures::StreamExt;

        let subject = SharedSubject::new(0, 0, BufferOverflow::Suspend).unwrap();

        let mut first = Box::pin(subject.emit(1));
        let mut second = Box::pin(subject.emit(2));
        let mut third = Box::pin(subject.emit(3));
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(futures::poll!(second.as_mut()).is_pending());
        assert!(futures::poll!(third.as_mut()).is_pending());

        drop(second);
        subject.assert_invariants();

        let mut subscription = subject.subscribe();
        let (observed, (), ()) = tokio::join!(
            async { (subscription.next().await, subscription.next().await) },
            first,
            third,
        );
        assert_eq!(observed, (Some(1), Some(3)));
    }
}
