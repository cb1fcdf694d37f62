// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
//! Core primitives for efflux: hot multicast streams with replay.
//!
//! This crate holds the runtime-agnostic heart of the library:
//!
//! - [`SharedSubject`]: a hot, multicast, replay-capable value stream with a
//!   bounded buffer, configurable [`BufferOverflow`] behavior and in-band
//!   suspension of producers.
//! - [`StateSubject`]: the single-value variant with distinct-by-equality
//!   updates and a synchronous [`value()`](StateSubject::value) snapshot.
//! - [`SubscriptionCount`]: the observable subscriber-count signal start
//!   policies consume.
//! - [`StreamItem`]: the value-or-error item type of upstream producers.
//!
//! Driving a cold producer into a shared subject under a start policy lives
//! in the `efflux-stream` crate.
//!
//! # Example
//!
//! ```
//! use efflux_core::{BufferOverflow, SharedSubject};
//! use futures::StreamExt;
//!
//! # tokio_test::block_on(async {
//! let subject = SharedSubject::new(1, 16, BufferOverflow::Suspend).unwrap();
//!
//! subject.emit("warm-up").await;
//!
//! // A late subscriber still sees the replayed value.
//! let mut subscriber = subject.subscribe();
//! assert_eq!(subscriber.next().await, Some("warm-up"));
//!
//! subject.emit("live").await;
//! assert_eq!(subscriber.next().await, Some("live"));
//! # });
//! ```

mod error;
mod overflow;
mod ring_buffer;
mod shared_subject;
mod slots;
mod state_subject;
mod stream_item;
mod subscription_count;

pub use error::{EffluxError, Result};
pub use overflow::BufferOverflow;
pub use shared_subject::{SharedSubject, SharedSubscription};
pub use state_subject::StateSubject;
pub use stream_item::StreamItem;
pub use subscription_count::SubscriptionCount;
