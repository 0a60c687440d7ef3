// SPDX-License-Identifier: MIT

//! Motion4Good: Social fitness challenges for good causes
//!
//! This crate provides the backend API for creating group fitness
//! challenges, tracking rep contributions from a motion detection
//! service, and computing the rewards each participant earns.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::ChallengeStore;
use services::{MotionClient, SessionService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: ChallengeStore,
    pub motion: MotionClient,
    pub sessions: SessionService,
}
