// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions)]
//! Test helpers shared by the efflux workspace.

pub mod helpers;
pub mod scripted;
pub mod source_probe;

pub use helpers::{assert_no_element_emitted, collect_n, drain_ready, expect_next_value, settle};
pub use scripted::{push, scripted_source};
pub use source_probe::{ProbeStream, SourceProbe};
