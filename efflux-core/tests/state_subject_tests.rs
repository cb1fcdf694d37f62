// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use efflux_core::StateSubject;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn holds_and_updates_the_current_value() {
    let state = StateSubject::new(10);
    assert_eq!(state.value(), 10);

    assert!(state.set_value(20));
    assert_eq!(state.value(), 20);
    assert_eq!(state.replay_snapshot(), vec![20]);
}

#[tokio::test]
async fn equal_updates_are_suppressed() {
    let state = StateSubject::new(0);
    let mut changes = state.subscribe();
    assert_eq!(changes.next().await, Some(0));

    assert!(!state.set_value(0));
    assert!(state.set_value(1));
    assert!(!state.set_value(1));
    assert!(state.set_value(2));

    assert_eq!(changes.next().await, Some(1));
    assert_eq!(changes.next().await, Some(2));
    tokio::select! {
        value = changes.next() => panic!("unexpected transition: {value:?}"),
        () = sleep(Duration::from_millis(50)) => {}
    }
}

#[tokio::test]
async fn late_subscriber_starts_from_the_current_value() {
    let state = StateSubject::new(0);
    state.set_value(1);

    let mut changes = state.subscribe();
    state.set_value(2);

    assert_eq!(changes.next().await, Some(1));
    assert_eq!(changes.next().await, Some(2));
}

#[tokio::test]
async fn reset_restores_the_initial_value() {
    let state = StateSubject::new(0);
    state.set_value(7);
    assert_eq!(state.value(), 7);

    state.reset_replay();
    assert_eq!(state.value(), 0);
    assert_eq!(state.replay_snapshot(), vec![0]);

    // Idempotent: a second reset does not republish the initial value.
    state.reset_replay();
    assert_eq!(state.value(), 0);
}

#[tokio::test]
async fn subscription_count_tracks_subscribers() {
    let state = StateSubject::new(0);
    let count = state.subscription_count();
    assert_eq!(count.get(), 0);

    let subscriber = state.subscribe();
    assert_eq!(count.get(), 1);
    drop(subscriber);
    assert_eq!(count.get(), 0);
}
