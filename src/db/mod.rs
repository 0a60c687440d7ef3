// SPDX-License-Identifier: MIT

//! Storage layer (in-memory challenge store).

pub mod store;

pub use store::{ChallengeStore, IncrementOutcome};
