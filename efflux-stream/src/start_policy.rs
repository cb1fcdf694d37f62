// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Start policies: when the sharing driver runs the upstream producer.
//!
//! A policy turns the subscriber-count signal of a shared stream into a lazy
//! sequence of [`SharingCommand`]s. The driver consumes that sequence with
//! cancel-latest semantics, so a policy only has to describe *what* should
//! happen for the current count, not how to undo the previous decision.

use efflux_core::SubscriptionCount;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;

/// Instruction from a start policy to the sharing driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingCommand {
    /// Start (or restart) collecting the upstream producer.
    Start,
    /// Stop collecting; the replay window is kept.
    Stop,
    /// Stop collecting and erase the replay window.
    StopAndReset,
}

/// Lazy command sequence produced by a [`StartPolicy`].
pub type CommandStream = BoxStream<'static, SharingCommand>;

/// Strategy deciding when sharing of the upstream producer starts and stops.
///
/// Implement this to customize sharing behavior beyond the built-ins, e.g.
/// starting only above a subscriber threshold. The driver deduplicates
/// consecutive identical commands and ignores everything before the first
/// [`Start`](SharingCommand::Start), so policies may re-emit freely.
pub trait StartPolicy: Send + Sync + 'static {
    /// Translate the subscriber-count signal into a command sequence.
    fn commands(&self, counts: SubscriptionCount) -> CommandStream;
}

/// Start the upstream immediately and never stop it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eager;

impl StartPolicy for Eager {
    fn commands(&self, _counts: SubscriptionCount) -> CommandStream {
        stream::once(future::ready(SharingCommand::Start))
            .chain(stream::pending())
            .boxed()
    }
}

/// Start the upstream when the first subscriber appears and never stop it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lazy;

impl StartPolicy for Lazy {
    fn commands(&self, counts: SubscriptionCount) -> CommandStream {
        stream::once(async move {
            if counts.get() == 0 {
                counts.changed(0).await;
            }
            SharingCommand::Start
        })
        .chain(stream::pending())
        .boxed()
    }
}

/// Run the upstream only while subscribers are present.
///
/// Every change of the subscriber count restarts the policy's decision
/// branch (latest wins): with subscribers, emit
/// [`Start`](SharingCommand::Start); without, wait `stop_delay`, then — if a
/// replay expiration is configured — emit [`Stop`](SharingCommand::Stop),
/// wait `replay_expiration`, and finally emit
/// [`StopAndReset`](SharingCommand::StopAndReset). A subscriber arriving
/// anywhere inside the dormant branch cancels it.
///
/// The default keeps the replay window forever once stopped
/// (`replay_expiration = Duration::MAX`).
#[derive(Debug, Clone, Copy)]
pub struct WhileSubscribed {
    stop_delay: Duration,
    replay_expiration: Duration,
}

impl WhileSubscribed {
    /// Policy with the given stop delay and replay expiration.
    pub fn new(stop_delay: Duration, replay_expiration: Duration) -> Self {
        Self {
            stop_delay,
            replay_expiration,
        }
    }

    /// Stop upstream collection and erase the replay window as soon as the
    /// last subscriber leaves.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

impl Default for WhileSubscribed {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::MAX)
    }
}

enum Phase {
    /// Decide on the current count, observed lazily on the first poll.
    Evaluate,
    /// Sharing is running (or the dormant branch completed); wait for the
    /// count to move.
    AwaitChange,
    /// No subscribers: waiting out the stop delay.
    StopDelay,
    /// Stopped: waiting out the replay expiration.
    ReplayDelay,
}

impl StartPolicy for WhileSubscribed {
    fn commands(&self, counts: SubscriptionCount) -> CommandStream {
        let stop_delay = self.stop_delay;
        let replay_expiration = self.replay_expiration;
        let seed = (None::<usize>, Phase::Evaluate, counts);
        stream::unfold(seed, move |(mut count, mut phase, counts)| async move {
            loop {
                match phase {
                    Phase::Evaluate => {
                        let current = match count {
                            Some(current) => current,
                            None => {
                                let observed = counts.get();
                                count = Some(observed);
                                observed
                            }
                        };
                        if current > 0 {
                            return Some((SharingCommand::Start, (count, Phase::AwaitChange, counts)));
                        }
                        phase = Phase::StopDelay;
                    }
                    Phase::AwaitChange => {
                        let seen = count.unwrap_or_else(|| counts.get());
                        count = Some(counts.changed(seen).await);
                        phase = Phase::Evaluate;
                    }
                    Phase::StopDelay => {
                        let seen = count.unwrap_or_else(|| counts.get());
                        tokio::select! {
                            latest = counts.changed(seen) => {
                                count = Some(latest);
                                phase = Phase::Evaluate;
                            }
                            () = tokio::time::sleep(stop_delay) => {
                                if replay_expiration > Duration::ZERO {
                                    return Some((
                                        SharingCommand::Stop,
                                        (count, Phase::ReplayDelay, counts),
                                    ));
                                }
                                return Some((
                                    SharingCommand::StopAndReset,
                                    (count, Phase::AwaitChange, counts),
                                ));
                            }
                        }
                    }
                    Phase::ReplayDelay => {
                        let seen = count.unwrap_or_else(|| counts.get());
                        tokio::select! {
                            latest = counts.changed(seen) => {
                                count = Some(latest);
                                phase = Phase::Evaluate;
                            }
                            () = tokio::time::sleep(replay_expiration) => {
                                return Some((
                                    SharingCommand::StopAndReset,
                                    (count, Phase::AwaitChange, counts),
                                ));
                            }
                        }
                    }
                }
            }
        })
        .boxed()
    }
}
