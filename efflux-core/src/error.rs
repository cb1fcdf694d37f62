// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Error types for the efflux shared-stream library.
//!
//! Construction errors are returned synchronously from the constructor that
//! detected them. Upstream failures never reach subscribers; they terminate
//! the sharing driver only (see `efflux-stream`).

use crate::BufferOverflow;

/// Root error type for all efflux operations.
#[derive(Debug, thiserror::Error)]
pub enum EffluxError {
    /// An initial value was configured together with `replay == 0`.
    ///
    /// The initial value lives in the replay window; without replay capacity
    /// there is nowhere to keep it.
    #[error("an initial value requires a replay capacity greater than zero")]
    InitialValueWithoutReplay,

    /// A dropping overflow strategy was configured with zero total capacity.
    ///
    /// `DropOldest`/`DropLatest` need at least one buffered value to act on;
    /// a zero-capacity stream only supports `Suspend` (rendezvous).
    #[error("overflow strategy {strategy:?} requires a positive buffer capacity")]
    OverflowRequiresCapacity {
        /// The offending strategy.
        strategy: BufferOverflow,
    },

    /// The upstream producer completed before emitting its first value.
    #[error("upstream completed before its first value")]
    EmptyUpstream,

    /// The upstream producer failed while the sharing driver was collecting it.
    #[error("upstream producer failed: {context}")]
    UpstreamFailed {
        /// Description of the upstream failure.
        context: String,
    },

    /// Custom error from user code, materialized into the stream.
    #[error("user error: {0}")]
    UserError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl EffluxError {
    /// Create an upstream-failure error with the given context.
    pub fn upstream(context: impl Into<String>) -> Self {
        Self::UpstreamFailed {
            context: context.into(),
        }
    }

    /// Wrap a user error.
    pub fn user_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::UserError(Box::new(error))
    }
}

impl Clone for EffluxError {
    fn clone(&self) -> Self {
        match self {
            Self::InitialValueWithoutReplay => Self::InitialValueWithoutReplay,
            Self::OverflowRequiresCapacity { strategy } => Self::OverflowRequiresCapacity {
                strategy: *strategy,
            },
            Self::EmptyUpstream => Self::EmptyUpstream,
            Self::UpstreamFailed { context } => Self::UpstreamFailed {
                context: context.clone(),
            },
            // The boxed error cannot be cloned; degrade to its message.
            Self::UserError(e) => Self::UpstreamFailed {
                context: format!("user error: {e}"),
            },
        }
    }
}

/// Specialized `Result` type for efflux operations.
pub type Result<T> = std::result::Result<T, EffluxError>;
