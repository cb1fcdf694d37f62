// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
//! # Efflux
//!
//! Hot shared streams for async Rust: multicast with replay for late
//! subscribers, bounded buffering with configurable overflow, and a
//! policy-driven background driver that turns a cold producer into a shared
//! source.
//!
//! ## Overview
//!
//! Efflux provides two hot stream primitives and the machinery to feed them:
//!
//! - [`SharedSubject`]: a multicast value stream. Every subscriber observes
//!   the current replay window on attach, then each value accepted
//!   afterwards, in order. Producers push through
//!   [`try_emit`](SharedSubject::try_emit) or the suspending
//!   [`emit`](SharedSubject::emit).
//! - [`StateSubject`]: the single-value variant with a synchronous
//!   [`value()`](StateSubject::value) snapshot and distinct-by-equality
//!   updates.
//! - [`shared_of`] / [`state_of`]: run a cold producer in a background task
//!   under a [`StartPolicy`] ([`Eager`], [`Lazy`], [`WhileSubscribed`]) and
//!   expose the read-only shared result.
//!
//! ## Quick Start
//!
//! ```rust
//! use efflux::prelude::*;
//! use futures::{stream, StreamExt};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Share a cold producer, starting it on the first subscriber.
//!     let shared = shared_of(
//!         || stream::iter((1..=3).map(StreamItem::Value)),
//!         1,
//!         Lazy,
//!     )
//!     .unwrap();
//!
//!     let mut subscriber = shared.subscribe();
//!     assert_eq!(subscriber.next().await, Some(1));
//!     assert_eq!(subscriber.next().await, Some(2));
//!     assert_eq!(subscriber.next().await, Some(3));
//!
//!     // A late subscriber still observes the replayed tail.
//!     let mut late = shared.subscribe();
//!     assert_eq!(late.next().await, Some(3));
//! }
//! ```
//!
//! ## Workspace Structure
//!
//! - [`efflux`](crate) - Main crate (this crate), re-exports the public surface
//! - [`efflux_core`] - Shared and state subjects, buffering, signals, errors
//! - [`efflux_stream`] - Start policies, sharing driver, subscription hook

pub use efflux_core::{
    BufferOverflow, EffluxError, Result, SharedSubject, SharedSubscription, StateSubject,
    StreamItem, SubscriptionCount,
};
pub use efflux_stream::{
    shared_of, shared_of_initial, shared_with, state_awaiting_first, state_of, CommandStream,
    Eager, EffluxShared, EffluxState, Lazy, OnSubscription, OnSubscriptionExt, SharedSpec,
    SharingCommand, StartPolicy, SubscriptionSink, WhileSubscribed, DEFAULT_EXTRA_BUFFER,
};

/// Prelude module re-exporting the commonly used types and traits.
///
/// ```ignore
/// use efflux::prelude::*;
///
/// let shared = shared_of(source, 1, WhileSubscribed::default())?;
/// let mut subscriber = shared.subscribe().on_subscription(|sink| sink.emit(0));
/// ```
pub mod prelude {
    pub use efflux_core::{
        BufferOverflow, EffluxError, SharedSubject, StateSubject, StreamItem,
    };
    pub use efflux_stream::{
        shared_of, shared_of_initial, shared_with, state_awaiting_first, state_of, Eager, Lazy,
        OnSubscriptionExt, SharedSpec, SharingCommand, StartPolicy, WhileSubscribed,
    };
}
