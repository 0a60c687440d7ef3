// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod leaderboard;
pub mod motion;
pub mod password;
pub mod rewards;
pub mod session;

pub use leaderboard::{ContributorRank, LeaderboardPage, RankScope, SortKey, SortOrder};
pub use motion::MotionClient;
pub use rewards::{ChallengeProgress, GoalStatus};
pub use session::{ClosedSession, SessionService, SessionSnapshot};
