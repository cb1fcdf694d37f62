// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
//! Sharing machinery for efflux: start policies, the sharing driver and the
//! subscription hook.
//!
//! A cold producer — a [`Stream`](futures::Stream) of
//! [`StreamItem`](efflux_core::StreamItem)s obtained from a factory — is
//! converted into a hot shared stream by [`shared_of`] (or a state stream by
//! [`state_of`]). A [`StartPolicy`] watches the subscriber count and tells
//! the driver when to run the producer:
//!
//! - [`Eager`]: immediately, forever.
//! - [`Lazy`]: from the first subscriber on, forever.
//! - [`WhileSubscribed`]: only while subscribers are present, with
//!   configurable stop delay and replay expiration.
//!
//! # Example
//!
//! ```
//! use efflux_core::StreamItem;
//! use efflux_stream::{shared_of, Lazy};
//! use futures::{stream, StreamExt};
//!
//! # tokio_test::block_on(async {
//! let shared = shared_of(
//!     || stream::iter(vec![StreamItem::Value(1), StreamItem::Value(2)]),
//!     1,
//!     Lazy,
//! )
//! .unwrap();
//!
//! let mut subscriber = shared.subscribe();
//! assert_eq!(subscriber.next().await, Some(1));
//! assert_eq!(subscriber.next().await, Some(2));
//! # });
//! ```

mod logging;
mod on_subscription;
mod share;
mod start_policy;

pub use on_subscription::{OnSubscription, OnSubscriptionExt, SubscriptionSink};
pub use share::{
    shared_of, shared_of_initial, shared_with, state_awaiting_first, state_of, EffluxShared,
    EffluxState, SharedSpec, DEFAULT_EXTRA_BUFFER,
};
pub use start_policy::{
    CommandStream, Eager, Lazy, SharingCommand, StartPolicy, WhileSubscribed,
};
