// SPDX-License-Identifier: MIT

//! Reward computation over challenge state.
//!
//! Pure functions that turn raw per-user, per-exercise rep counts into
//! capped progress, reward contributions, maximum-possible contributions
//! and completion status. Every view of a challenge goes through this
//! module instead of re-deriving the arithmetic.
//!
//! Two distinct rep totals exist per exercise:
//! - *actual* reps: the uncapped community sum, used only for goal-met
//!   evaluation (overshoot still counts as goal met);
//! - *capped* reps: the community sum clamped to the goal, used for
//!   displayed progress and rewards (overshoot never inflates rewards).

use crate::models::{Challenge, RewardSpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Reward earned for a rep count: `floor(reps / per_reps) * amount`.
///
/// Batch semantics, not pro-rated: partial progress toward the next
/// `per_reps` threshold contributes nothing. A non-positive `per_reps`
/// yields zero instead of panicking, in case historical records carry a
/// malformed rate.
pub fn contribution(reps: u64, reward: RewardSpec) -> f64 {
    if reward.per_reps == 0 {
        return 0.0;
    }
    (reps / reward.per_reps) as f64 * reward.amount
}

/// Uncapped community rep total per enabled exercise.
pub fn actual_reps(challenge: &Challenge) -> HashMap<String, u64> {
    let mut totals: HashMap<String, u64> = challenge
        .enabled_exercises
        .iter()
        .map(|e| (e.clone(), 0))
        .collect();

    for user_record in challenge.contributions.values() {
        for (exercise, &reps) in user_record {
            // Contributions for disabled exercises are ignored here.
            // Stored counts are client-influenced, so the community sum
            // saturates rather than overflowing.
            if let Some(total) = totals.get_mut(exercise) {
                *total = total.saturating_add(reps);
            }
        }
    }
    totals
}

/// Community rep totals clamped to each exercise's goal.
pub fn capped_reps(challenge: &Challenge) -> HashMap<String, u64> {
    actual_reps(challenge)
        .into_iter()
        .map(|(exercise, total)| {
            let goal = challenge.rep_goal.get(&exercise).copied().unwrap_or(0);
            (exercise, total.min(goal))
        })
        .collect()
}

/// Total reward contribution across enabled exercises, from capped reps.
pub fn total_contribution(challenge: &Challenge) -> f64 {
    capped_reps(challenge)
        .iter()
        .map(|(exercise, &reps)| {
            challenge
                .rep_reward
                .get(exercise)
                .map(|&reward| contribution(reps, reward))
                .unwrap_or(0.0)
        })
        .sum()
}

/// Reward contribution if every enabled exercise's goal were fully met.
pub fn max_contribution(challenge: &Challenge) -> f64 {
    challenge
        .enabled_exercises
        .iter()
        .map(|exercise| {
            let goal = challenge.rep_goal.get(exercise).copied().unwrap_or(0);
            challenge
                .rep_reward
                .get(exercise)
                .map(|&reward| contribution(goal, reward))
                .unwrap_or(0.0)
        })
        .sum()
}

/// Whether every enabled exercise's uncapped total meets its goal.
pub fn all_goals_met(challenge: &Challenge) -> bool {
    let actuals = actual_reps(challenge);
    challenge.enabled_exercises.iter().all(|exercise| {
        let goal = challenge.rep_goal.get(exercise).copied().unwrap_or(0);
        actuals.get(exercise).copied().unwrap_or(0) >= goal
    })
}

/// Completion status of a challenge.
///
/// `Undetermined` while the challenge is neither past its end date nor
/// explicitly flagged complete. Callers must not collapse `Undetermined`
/// into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Met,
    Failed,
    Undetermined,
}

/// Evaluate a challenge's completion status at `now`.
pub fn completion_status(challenge: &Challenge, now: DateTime<Utc>) -> GoalStatus {
    if !challenge.is_ended(now) {
        return GoalStatus::Undetermined;
    }
    if all_goals_met(challenge) {
        GoalStatus::Met
    } else {
        GoalStatus::Failed
    }
}

/// Per-exercise progress view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseProgress {
    pub exercise: String,
    pub goal: u64,
    /// Uncapped community total (goal-met evaluation)
    pub actual_reps: u64,
    /// Community total clamped to the goal (display and rewards)
    pub capped_reps: u64,
    /// `min(capped / goal, 1) * 100`
    pub percent: f64,
    /// Reward earned from capped reps
    pub contribution: f64,
    /// Reward if the goal were fully met
    pub max_contribution: f64,
}

/// Aggregate progress view of a challenge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeProgress {
    pub challenge_id: String,
    pub exercises: Vec<ExerciseProgress>,
    pub total_contribution: f64,
    pub max_contribution: f64,
    pub reward_type: String,
    pub status: GoalStatus,
    pub active: bool,
}

/// Compute the full progress view for a challenge at `now`.
///
/// Exercises appear in `enabled_exercises` order.
pub fn progress(challenge: &Challenge, now: DateTime<Utc>) -> ChallengeProgress {
    let actuals = actual_reps(challenge);
    let capped = capped_reps(challenge);

    let exercises: Vec<ExerciseProgress> = challenge
        .enabled_exercises
        .iter()
        .map(|exercise| {
            let goal = challenge.rep_goal.get(exercise).copied().unwrap_or(0);
            let actual = actuals.get(exercise).copied().unwrap_or(0);
            let capped = capped.get(exercise).copied().unwrap_or(0);
            let reward = challenge
                .rep_reward
                .get(exercise)
                .copied()
                .unwrap_or(RewardSpec::new(0.0, 1));
            let percent = if goal > 0 {
                (capped as f64 / goal as f64).min(1.0) * 100.0
            } else {
                0.0
            };
            ExerciseProgress {
                exercise: exercise.clone(),
                goal,
                actual_reps: actual,
                capped_reps: capped,
                percent,
                contribution: contribution(capped, reward),
                max_contribution: contribution(goal, reward),
            }
        })
        .collect();

    let total = exercises.iter().map(|e| e.contribution).sum();
    let max = exercises.iter().map(|e| e.max_contribution).sum();

    ChallengeProgress {
        challenge_id: challenge.id.clone(),
        exercises,
        total_contribution: total,
        max_contribution: max,
        reward_type: challenge.rep_reward_type.clone(),
        status: completion_status(challenge, now),
        active: challenge.is_active(now),
    }
}
