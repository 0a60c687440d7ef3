// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod challenge;
pub mod user;

pub use challenge::{Challenge, CreateChallengeRequest, RewardSpec};
pub use user::User;
