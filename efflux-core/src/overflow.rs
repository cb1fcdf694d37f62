// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

/// Strategy applied when a value arrives and the shared buffer is full.
///
/// "Full" means the buffered-value count has reached the configured capacity
/// *and* the slowest subscriber is still positioned inside the replay window,
/// so dropping buffered values would make it lose data silently. Which of the
/// three outcomes happens then is chosen at construction time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BufferOverflow {
    /// Suspend the emitter until a subscriber frees buffer space.
    ///
    /// This is the only strategy valid for a zero-capacity (rendezvous)
    /// configuration.
    #[default]
    Suspend,
    /// Drop the oldest buffered value. Subscribers that had not consumed it
    /// yet are advanced past it; the loss is part of the contract.
    DropOldest,
    /// Drop the incoming value and keep the buffer untouched.
    DropLatest,
}
