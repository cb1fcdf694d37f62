// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use efflux_core::SubscriptionCount;
use efflux_stream::{
    shared_of, shared_of_initial, state_awaiting_first, state_of, CommandStream, Eager, Lazy,
    SharingCommand, StartPolicy, WhileSubscribed,
};
use efflux_test_utils::{assert_no_element_emitted, settle, SourceProbe};
use futures::stream::{self, StreamExt};

#[tokio::test]
async fn lazy_sharing_activates_on_the_first_subscriber() {
    let probe = SourceProbe::values(["OK"]);
    let shared = shared_of(probe.factory(), 1, Lazy).unwrap();

    settle().await;
    assert_eq!(probe.activations(), 0);

    let mut subscriber = shared.subscribe();
    assert_eq!(subscriber.next().await, Some("OK"));
    assert_eq!(probe.activations(), 1);

    // Lazy keeps collecting after the subscriber leaves.
    drop(subscriber);
    settle().await;
    assert_eq!(probe.live_collections(), 1);
}

#[tokio::test]
async fn eager_sharing_activates_without_subscribers() {
    let probe = SourceProbe::values(["OK"]);
    let _shared = shared_of(probe.factory(), 0, Eager).unwrap();

    settle().await;
    assert_eq!(probe.activations(), 1);
    assert_eq!(probe.live_collections(), 1);
}

#[tokio::test]
async fn while_subscribed_cancels_and_restarts_the_upstream() {
    let probe = SourceProbe::values(["OK"]);
    let shared = shared_of(probe.factory(), 1, WhileSubscribed::immediate()).unwrap();

    let mut subscriber = shared.subscribe();
    assert_eq!(subscriber.next().await, Some("OK"));
    assert_eq!(probe.activations(), 1);

    // Last subscriber leaves: the collection is cancelled and the replay
    // window reset.
    drop(subscriber);
    settle().await;
    assert_eq!(probe.live_collections(), 0);
    assert_eq!(shared.replay_snapshot(), Vec::<&str>::new());

    // A new subscriber restarts the cold producer from scratch.
    let mut subscriber = shared.subscribe();
    assert_eq!(subscriber.next().await, Some("OK"));
    assert_eq!(probe.activations(), 2);
}

#[tokio::test]
async fn upstream_failure_terminates_the_driver_only() {
    let probe = SourceProbe::failing(["OK"], "boom");
    let shared = shared_of(probe.factory(), 1, Lazy).unwrap();

    let mut subscriber = shared.subscribe();
    assert_eq!(subscriber.next().await, Some("OK"));

    // The failure never reaches the subscriber; it just stops seeing values.
    assert_no_element_emitted(&mut subscriber, 50).await;

    // The driver exited, running its reset finalizer.
    assert_eq!(shared.replay_snapshot(), Vec::<&str>::new());
}

#[tokio::test]
async fn upstream_completion_keeps_the_shared_stream_serving() {
    let probe = SourceProbe::completing(["OK"]);
    let shared = shared_of(probe.factory(), 1, Eager).unwrap();

    settle().await;
    assert_eq!(probe.live_collections(), 0);

    // The driver is still alive; the replay window survives completion.
    assert_eq!(shared.replay_snapshot(), vec!["OK"]);
    let mut late = shared.subscribe();
    assert_eq!(late.next().await, Some("OK"));
}

#[tokio::test]
async fn initial_value_is_served_before_upstream_values() {
    let probe = SourceProbe::values([2, 3]);
    let shared = shared_of_initial(probe.factory(), 1, Lazy, 1).unwrap();

    let mut subscriber = shared.subscribe();
    assert_eq!(subscriber.next().await, Some(1));
    assert_eq!(subscriber.next().await, Some(2));
    assert_eq!(subscriber.next().await, Some(3));
}

/// Start policy that only runs the upstream at or above a subscriber
/// threshold.
struct StartWhenAtLeast(usize);

impl StartPolicy for StartWhenAtLeast {
    fn commands(&self, counts: SubscriptionCount) -> CommandStream {
        let threshold = self.0;
        stream::unfold((None::<usize>, counts), move |(seen, counts)| async move {
            let current = match seen {
                None => counts.get(),
                Some(seen) => counts.changed(seen).await,
            };
            let command = if current >= threshold {
                SharingCommand::Start
            } else {
                SharingCommand::Stop
            };
            Some((command, (Some(current), counts)))
        })
        .boxed()
    }
}

#[tokio::test]
async fn threshold_policy_starts_at_two_subscribers() {
    let probe = SourceProbe::values(["OK"]);
    let shared = shared_of(probe.factory(), 0, StartWhenAtLeast(2)).unwrap();

    let mut first = shared.subscribe();
    settle().await;
    assert_eq!(probe.activations(), 0, "one subscriber must not start sharing");

    let mut second = shared.subscribe();
    assert_eq!(first.next().await, Some("OK"));
    assert_eq!(second.next().await, Some("OK"));
    assert_eq!(probe.activations(), 1);

    // Dropping below the threshold cancels the upstream.
    drop(second);
    settle().await;
    assert_eq!(probe.live_collections(), 0);
    drop(first);
}

#[tokio::test]
async fn state_of_applies_distinct_updates() {
    let probe = SourceProbe::values([0, 1, 1, 2]);
    let state = state_of(probe.factory(), Eager, 0);

    let mut changes = state.subscribe();
    assert_eq!(changes.next().await, Some(0));
    assert_eq!(changes.next().await, Some(1));
    assert_eq!(changes.next().await, Some(2));
    assert_eq!(state.value(), 2);
}

#[tokio::test]
async fn state_awaiting_first_roots_at_the_first_value() {
    let upstream = stream::iter([5, 6].map(efflux_core::StreamItem::Value));
    let state = state_awaiting_first(upstream).await.unwrap();

    assert_eq!(state.value(), 5);
    let mut changes = state.subscribe();
    // The remainder of the same stream keeps driving the state.
    assert_eq!(changes.next().await, Some(5));
    assert_eq!(changes.next().await, Some(6));
    assert_eq!(state.value(), 6);
}

#[tokio::test]
async fn state_awaiting_first_fails_on_an_empty_upstream() {
    let upstream = stream::iter(Vec::<efflux_core::StreamItem<i32>>::new());
    let error = state_awaiting_first(upstream).await.unwrap_err();
    assert!(matches!(error, efflux_core::EffluxError::EmptyUpstream));
}
