// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use efflux_core::StreamItem;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A hand-driven cold source: the returned factory hands out the channel's
/// receiving side on its first activation, so a test pushes upstream items
/// imperatively through the sender. Later activations get a silent stream.
pub fn scripted_source<T: Send + 'static>() -> (
    UnboundedSender<StreamItem<T>>,
    impl FnMut() -> BoxStream<'static, StreamItem<T>> + Send + 'static,
) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let mut receiver = Some(receiver);
    let factory = move || match receiver.take() {
        Some(receiver) => UnboundedReceiverStream::new(receiver).boxed(),
        None => stream::pending().boxed(),
    };
    (sender, factory)
}

/// Push a value through a scripted source.
pub fn push<T>(sender: &UnboundedSender<StreamItem<T>>, value: T) {
    sender
        .send(StreamItem::Value(value))
        .expect("scripted source receiver dropped");
}
