// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::EffluxError;

/// An upstream item that is either a value or a failure.
///
/// Cold producers feed the sharing driver with `StreamItem<T>`; an `Error`
/// terminates the driver's collection, following Rx-style semantics where a
/// failure ends the sequence. Subscriber-facing streams carry plain `T` —
/// the shared stream itself never fails and never completes, so there is no
/// item wrapper on that side.
#[derive(Debug, Clone)]
pub enum StreamItem<T> {
    /// A successful value.
    Value(T),
    /// A failure of the producer.
    Error(EffluxError),
}
