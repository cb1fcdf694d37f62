// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The sharing driver: one background task converting a cold producer into
//! a hot shared (or state) stream under a start policy.
//!
//! ## Characteristics
//!
//! - **Single collector**: the upstream runs at most once at a time; its
//!   values fan out through the shared subject.
//! - **Cancel-latest**: every command from the policy stops the in-flight
//!   upstream collection before it is acted on.
//! - **Restartable**: cold producers are factories; each
//!   [`Start`](SharingCommand::Start) obtains a fresh collection.
//! - **Failure isolation**: an upstream [`StreamItem::Error`] terminates the
//!   driver and is logged; subscribers are unaffected and keep waiting.
//! - **Owned lifecycle**: dropping the returned handle aborts the driver;
//!   the replay window is reset on every exit path.

use crate::start_policy::{CommandStream, SharingCommand, StartPolicy};
use crate::Eager;
use efflux_core::{
    BufferOverflow, EffluxError, Result, SharedSubject, SharedSubscription, StateSubject,
    StreamItem, SubscriptionCount,
};
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Extra buffer capacity used by the sharing factories when the producer
/// carries no explicit hint.
pub const DEFAULT_EXTRA_BUFFER: usize = 64;

/// Buffering configuration of a driver-owned shared stream.
///
/// This is the seam for producers that carry their own capacity hint: a
/// buffered cold producer hands its capacity and overflow strategy to the
/// shared buffer here instead of stacking a second buffer in front of it.
#[derive(Debug, Clone, Copy)]
pub struct SharedSpec {
    /// Values retained for late subscribers.
    pub replay: usize,
    /// Additional capacity for slow subscribers.
    pub extra_buffer: usize,
    /// Behavior when the buffer is full.
    pub overflow: BufferOverflow,
}

impl SharedSpec {
    /// Default buffering for the given replay capacity.
    pub fn replay(replay: usize) -> Self {
        Self {
            replay,
            extra_buffer: DEFAULT_EXTRA_BUFFER,
            overflow: BufferOverflow::Suspend,
        }
    }

    /// Explicit buffering, typically forwarded from an upstream hint.
    pub fn buffered(replay: usize, extra_buffer: usize, overflow: BufferOverflow) -> Self {
        Self {
            replay,
            extra_buffer,
            overflow,
        }
    }
}

/// Read-only shared stream driven by a background task.
///
/// Created by [`shared_of`] and friends. Exposes the subscriber surface of
/// the underlying subject; emission stays with the driver. Dropping the
/// handle stops sharing and resets the replay window.
pub struct EffluxShared<T> {
    subject: SharedSubject<T>,
    driver: JoinHandle<()>,
}

impl<T: Clone + Send + Sync + 'static> EffluxShared<T> {
    fn start<S, F, P>(subject: SharedSubject<T>, source: F, policy: P) -> Self
    where
        S: Stream<Item = StreamItem<T>> + Send + 'static,
        F: FnMut() -> S + Send + 'static,
        P: StartPolicy,
    {
        let driver = tokio::spawn(drive(
            subject.clone(),
            subject.subscription_count(),
            source,
            policy,
        ));
        Self { subject, driver }
    }

    /// Attach a subscriber; see [`SharedSubject::subscribe`].
    pub fn subscribe(&self) -> SharedSubscription<T> {
        self.subject.subscribe()
    }

    /// Copy of the current replay window.
    pub fn replay_snapshot(&self) -> Vec<T> {
        self.subject.replay_snapshot()
    }

    /// Observable subscriber-count signal.
    pub fn subscription_count(&self) -> SubscriptionCount {
        self.subject.subscription_count()
    }
}

impl<T> Drop for EffluxShared<T> {
    fn drop(&mut self) {
        // The driver's finalizer resets the replay window on abort.
        self.driver.abort();
    }
}

/// Read-only state stream driven by a background task.
///
/// Created by [`state_of`] / [`state_awaiting_first`]. Dropping the handle
/// stops sharing and restores the initial value.
pub struct EffluxState<T> {
    subject: StateSubject<T>,
    driver: JoinHandle<()>,
}

impl<T> std::fmt::Debug for EffluxState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffluxState").finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> EffluxState<T> {
    /// Snapshot of the current value.
    pub fn value(&self) -> T {
        self.subject.value()
    }

    /// Attach a subscriber; it observes the current value first.
    pub fn subscribe(&self) -> SharedSubscription<T> {
        self.subject.subscribe()
    }

    /// Copy of the replay window; always the single current value.
    pub fn replay_snapshot(&self) -> Vec<T> {
        self.subject.replay_snapshot()
    }

    /// Observable subscriber-count signal.
    pub fn subscription_count(&self) -> SubscriptionCount {
        self.subject.subscription_count()
    }
}

impl<T> Drop for EffluxState<T> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Share a cold producer as a hot stream with `replay` retained values and
/// default buffering.
///
/// `source` is invoked once per [`Start`](SharingCommand::Start) command to
/// obtain a fresh collection of the cold producer.
///
/// # Errors
///
/// Propagates the construction validation of [`SharedSubject::new`].
pub fn shared_of<T, S, F, P>(source: F, replay: usize, policy: P) -> Result<EffluxShared<T>>
where
    T: Clone + Send + Sync + 'static,
    S: Stream<Item = StreamItem<T>> + Send + 'static,
    F: FnMut() -> S + Send + 'static,
    P: StartPolicy,
{
    shared_with(source, policy, SharedSpec::replay(replay))
}

/// Share a cold producer with explicit buffering.
///
/// # Errors
///
/// Propagates the construction validation of [`SharedSubject::new`].
pub fn shared_with<T, S, F, P>(source: F, policy: P, spec: SharedSpec) -> Result<EffluxShared<T>>
where
    T: Clone + Send + Sync + 'static,
    S: Stream<Item = StreamItem<T>> + Send + 'static,
    F: FnMut() -> S + Send + 'static,
    P: StartPolicy,
{
    let subject = SharedSubject::new(spec.replay, spec.extra_buffer, spec.overflow)?;
    Ok(EffluxShared::start(subject, source, policy))
}

/// Share a cold producer seeding the replay window with `initial`.
///
/// # Errors
///
/// Propagates the construction validation of [`SharedSubject::with_initial`].
pub fn shared_of_initial<T, S, F, P>(
    source: F,
    replay: usize,
    policy: P,
    initial: T,
) -> Result<EffluxShared<T>>
where
    T: Clone + Send + Sync + 'static,
    S: Stream<Item = StreamItem<T>> + Send + 'static,
    F: FnMut() -> S + Send + 'static,
    P: StartPolicy,
{
    let subject =
        SharedSubject::with_initial(replay, DEFAULT_EXTRA_BUFFER, BufferOverflow::Suspend, initial)?;
    Ok(EffluxShared::start(subject, source, policy))
}

/// Drive a cold producer into a state stream rooted at `initial`.
pub fn state_of<T, S, F, P>(source: F, policy: P, initial: T) -> EffluxState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    S: Stream<Item = StreamItem<T>> + Send + 'static,
    F: FnMut() -> S + Send + 'static,
    P: StartPolicy,
{
    let subject = StateSubject::new(initial);
    let driver = tokio::spawn(drive(
        subject.clone(),
        subject.subscription_count(),
        source,
        policy,
    ));
    EffluxState { subject, driver }
}

/// Suspend until `source` produces its first value, then share the remainder
/// eagerly as a state stream rooted at that value.
///
/// # Errors
///
/// Returns [`EffluxError::EmptyUpstream`] when the source completes before
/// its first value, or the source's own error when it fails first.
pub async fn state_awaiting_first<T, S>(source: S) -> Result<EffluxState<T>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    S: Stream<Item = StreamItem<T>> + Send + 'static,
{
    let mut source = source.boxed();
    let first = match source.next().await {
        Some(StreamItem::Value(value)) => value,
        Some(StreamItem::Error(error)) => return Err(error),
        None => return Err(EffluxError::EmptyUpstream),
    };
    // The remainder of the very same stream continues the state; Eager fires
    // a single Start, so the factory is invoked exactly once.
    let mut rest = Some(source);
    let factory = move || {
        rest.take()
            .unwrap_or_else(|| stream::empty().boxed())
    };
    Ok(state_of(factory, Eager, first))
}

/// Destination of the driver's pump; lets shared and state streams share one
/// driver implementation.
trait ShareSink<T>: Clone + Send + Sync + 'static {
    fn deliver(&self, value: T) -> impl Future<Output = ()> + Send;
    fn reset(&self);
}

impl<T: Clone + Send + Sync + 'static> ShareSink<T> for SharedSubject<T> {
    fn deliver(&self, value: T) -> impl Future<Output = ()> + Send {
        self.emit(value)
    }

    fn reset(&self) {
        self.reset_replay();
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ShareSink<T> for StateSubject<T> {
    fn deliver(&self, value: T) -> impl Future<Output = ()> + Send {
        let _ = self.set_value(value);
        future::ready(())
    }

    fn reset(&self) {
        self.reset_replay();
    }
}

/// Resets the replay window when the driver exits, whichever way it exits.
struct ResetOnExit<T, K: ShareSink<T>> {
    sink: K,
    _values: PhantomData<fn() -> T>,
}

impl<T, K: ShareSink<T>> Drop for ResetOnExit<T, K> {
    fn drop(&mut self) {
        self.sink.reset();
    }
}

type Collection = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

async fn drive<T, K, S, F, P>(sink: K, counts: SubscriptionCount, mut source: F, policy: P)
where
    T: Send + 'static,
    K: ShareSink<T>,
    S: Stream<Item = StreamItem<T>> + Send + 'static,
    F: FnMut() -> S + Send + 'static,
    P: StartPolicy,
{
    let _finalizer = ResetOnExit {
        sink: sink.clone(),
        _values: PhantomData,
    };
    let mut commands = sharing_pipeline(policy.commands(counts));
    let mut collection: Option<Collection> = None;
    loop {
        tokio::select! {
            command = commands.next() => {
                // Cancel-latest: the in-flight collection is dropped before
                // the new command takes effect.
                collection = None;
                match command {
                    Some(SharingCommand::Start) => {
                        let upstream = source();
                        collection = Some(Box::pin(pump(sink.clone(), upstream)));
                    }
                    Some(SharingCommand::Stop) => {}
                    Some(SharingCommand::StopAndReset) => sink.reset(),
                    None => break,
                }
            }
            outcome = await_collection(&mut collection) => {
                collection = None;
                if let Err(error) = outcome {
                    crate::error!("shared upstream failed: {error}");
                    return;
                }
            }
        }
    }
    // The command sequence ended; let a running collection finish.
    if let Some(active) = collection.take() {
        if let Err(error) = active.await {
            crate::error!("shared upstream failed: {error}");
        }
    }
}

async fn await_collection(collection: &mut Option<Collection>) -> Result<()> {
    match collection.as_mut() {
        Some(active) => active.as_mut().await,
        None => future::pending().await,
    }
}

async fn pump<T, K, S>(sink: K, upstream: S) -> Result<()>
where
    T: Send + 'static,
    K: ShareSink<T>,
    S: Stream<Item = StreamItem<T>> + Send,
{
    futures::pin_mut!(upstream);
    while let Some(item) = upstream.next().await {
        match item {
            StreamItem::Value(value) => sink.deliver(value).await,
            StreamItem::Error(error) => return Err(error),
        }
    }
    Ok(())
}

/// Trailing policy pipeline: ignore everything before the first `Start`,
/// then suppress consecutive duplicates.
fn sharing_pipeline(commands: CommandStream) -> CommandStream {
    let last: Arc<Mutex<Option<SharingCommand>>> = Arc::new(Mutex::new(None));
    commands
        .skip_while(|command| future::ready(*command != SharingCommand::Start))
        .filter(move |command| {
            let last = Arc::clone(&last);
            let command = *command;
            future::ready({
                let mut last = last.lock();
                let duplicate = *last == Some(command);
                *last = Some(command);
                !duplicate
            })
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipeline_drops_prefix_and_duplicates() {
        use SharingCommand::{Start, Stop, StopAndReset};

        let commands = stream::iter(vec![
            Stop,
            StopAndReset,
            Start,
            Start,
            Stop,
            Stop,
            Start,
            StopAndReset,
        ])
        .boxed();

        let filtered: Vec<_> = sharing_pipeline(commands).collect().await;
        assert_eq!(filtered, vec![Start, Stop, Start, StopAndReset]);
    }
}
