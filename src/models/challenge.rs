// SPDX-License-Identifier: MIT

//! Challenge model and wire formats.
//!
//! The reward-shape normalization lives here, at the serde boundary: a
//! per-exercise reward may arrive either as an `{amount, perReps}` pair or
//! as a bare number (legacy shorthand for `perReps = 1`). Every consumer
//! sees the pair form only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Reward rate for one exercise: `amount` granted per `per_reps` completed reps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RewardSpecWire")]
pub struct RewardSpec {
    pub amount: f64,
    pub per_reps: u64,
}

impl RewardSpec {
    pub fn new(amount: f64, per_reps: u64) -> Self {
        Self { amount, per_reps }
    }
}

/// Wire form of a reward. Order matters: the pair form is tried first so a
/// JSON object never falls through to the number variant.
#[derive(Deserialize)]
#[serde(untagged)]
enum RewardSpecWire {
    Pair {
        amount: f64,
        #[serde(rename = "perReps", alias = "per_reps")]
        per_reps: u64,
    },
    Bare(f64),
}

impl From<RewardSpecWire> for RewardSpec {
    fn from(wire: RewardSpecWire) -> Self {
        match wire {
            RewardSpecWire::Pair { amount, per_reps } => Self { amount, per_reps },
            RewardSpecWire::Bare(amount) => Self {
                amount,
                per_reps: 1,
            },
        }
    }
}

/// A time-boxed community challenge.
///
/// Serialized with camelCase field names for wire compatibility with
/// existing frontend clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    /// Opaque identifier, unique and immutable
    pub id: String,
    pub name: String,
    pub description: String,
    /// User who created the challenge (only they may delete it)
    pub creator_user_id: String,
    /// Exercise kinds tracked by this challenge (non-empty, ordered)
    pub enabled_exercises: Vec<String>,
    /// Currently enrolled user ids
    pub participants: Vec<String>,
    /// user id -> exercise -> cumulative raw rep count.
    /// Monotonically non-decreasing; removed whole when a user unenrolls.
    pub contributions: HashMap<String, HashMap<String, u64>>,
    /// exercise -> target rep count (positive per enabled exercise)
    pub rep_goal: HashMap<String, u64>,
    /// exercise -> reward rate
    pub rep_reward: HashMap<String, RewardSpec>,
    /// Unit label for rewards, shared by all exercises (e.g. "trees planted")
    pub rep_reward_type: String,
    /// Free-text prize for reaching every goal
    pub completion_reward: String,
    pub start_date: DateTime<Utc>,
    /// Strictly after `start_date`
    pub end_date: DateTime<Utc>,
    /// Explicit terminal flag, independent of date-based expiry
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    /// Active: within the challenge window and not flagged complete.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.completed && now >= self.start_date && now <= self.end_date
    }

    /// Ended: past the end date or flagged complete.
    pub fn is_ended(&self, now: DateTime<Utc>) -> bool {
        self.completed || now > self.end_date
    }

    pub fn is_enrolled(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// Request body for challenge creation (snake_case, matching the public API).
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateChallengeRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: String,
    #[validate(length(min = 1))]
    pub enabled_exercises: Vec<String>,
    pub rep_goal: HashMap<String, u64>,
    pub rep_reward: HashMap<String, RewardSpec>,
    pub rep_reward_type: String,
    pub completion_reward: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl CreateChallengeRequest {
    /// Check the invariants that `validator` attributes can't express.
    ///
    /// Misconfigured goals and rewards are rejected here, at creation time,
    /// so they never reach the reward computations.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.end_date <= self.start_date {
            return Err("end_date must be strictly after start_date".to_string());
        }

        let enabled: std::collections::HashSet<&str> =
            self.enabled_exercises.iter().map(String::as_str).collect();
        if enabled.len() != self.enabled_exercises.len() {
            return Err("enabled_exercises must not contain duplicates".to_string());
        }

        let goal_keys: std::collections::HashSet<&str> =
            self.rep_goal.keys().map(String::as_str).collect();
        if goal_keys != enabled {
            return Err("rep_goal keys must match enabled_exercises".to_string());
        }

        let reward_keys: std::collections::HashSet<&str> =
            self.rep_reward.keys().map(String::as_str).collect();
        if reward_keys != enabled {
            return Err("rep_reward keys must match enabled_exercises".to_string());
        }

        for (exercise, &goal) in &self.rep_goal {
            if goal == 0 {
                return Err(format!("rep_goal for '{}' must be positive", exercise));
            }
        }
        for (exercise, reward) in &self.rep_reward {
            if reward.per_reps == 0 {
                return Err(format!("per_reps for '{}' must be positive", exercise));
            }
            if reward.amount < 0.0 {
                return Err(format!("reward amount for '{}' must not be negative", exercise));
            }
        }

        Ok(())
    }

    /// Build the stored challenge. The single owned transform from the API
    /// shape to the internal model.
    pub fn into_challenge(self, id: String, creator_user_id: String, now: DateTime<Utc>) -> Challenge {
        Challenge {
            id,
            name: self.name,
            description: self.description,
            creator_user_id,
            enabled_exercises: self.enabled_exercises,
            participants: Vec::new(),
            contributions: HashMap::new(),
            rep_goal: self.rep_goal,
            rep_reward: self.rep_reward,
            rep_reward_type: self.rep_reward_type,
            completion_reward: self.completion_reward,
            start_date: self.start_date,
            end_date: self.end_date,
            completed: false,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_request() -> CreateChallengeRequest {
        CreateChallengeRequest {
            name: "Trees for Squats".to_string(),
            description: "Squat to plant trees".to_string(),
            enabled_exercises: vec!["squats".to_string()],
            rep_goal: HashMap::from([("squats".to_string(), 1000)]),
            rep_reward: HashMap::from([("squats".to_string(), RewardSpec::new(1.0, 50))]),
            rep_reward_type: "trees planted".to_string(),
            completion_reward: "A forest".to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_reward_spec_normalizes_bare_number() {
        // Scenario D: bare number 5 means {amount: 5, perReps: 1}
        let spec: RewardSpec = serde_json::from_str("5").unwrap();
        assert_eq!(spec, RewardSpec::new(5.0, 1));

        let spec: RewardSpec = serde_json::from_str("0.25").unwrap();
        assert_eq!(spec, RewardSpec::new(0.25, 1));
    }

    #[test]
    fn test_reward_spec_accepts_pair_forms() {
        let spec: RewardSpec = serde_json::from_str(r#"{"amount": 1, "perReps": 50}"#).unwrap();
        assert_eq!(spec, RewardSpec::new(1.0, 50));

        let spec: RewardSpec = serde_json::from_str(r#"{"amount": 2.5, "per_reps": 10}"#).unwrap();
        assert_eq!(spec, RewardSpec::new(2.5, 10));
    }

    #[test]
    fn test_reward_map_mixes_both_forms() {
        let rewards: HashMap<String, RewardSpec> = serde_json::from_str(
            r#"{"squats": {"amount": 1, "perReps": 50}, "jumping_jacks": 5}"#,
        )
        .unwrap();
        assert_eq!(rewards["squats"], RewardSpec::new(1.0, 50));
        assert_eq!(rewards["jumping_jacks"], RewardSpec::new(5.0, 1));
    }

    #[test]
    fn test_challenge_serializes_camel_case() {
        let challenge = base_request().into_challenge(
            "c1".to_string(),
            "u1".to_string(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );
        let json = serde_json::to_value(&challenge).unwrap();
        assert!(json.get("repGoal").is_some());
        assert!(json.get("creatorUserId").is_some());
        assert!(json.get("enabledExercises").is_some());
        assert_eq!(json["repReward"]["squats"]["perReps"], 50);
    }

    #[test]
    fn test_invariants_accept_valid_request() {
        assert!(base_request().check_invariants().is_ok());
    }

    #[test]
    fn test_invariants_reject_end_before_start() {
        let mut req = base_request();
        req.end_date = req.start_date;
        assert!(req.check_invariants().is_err());
    }

    #[test]
    fn test_invariants_reject_mismatched_goal_keys() {
        let mut req = base_request();
        req.rep_goal = HashMap::from([("pushups".to_string(), 100)]);
        assert!(req.check_invariants().is_err());
    }

    #[test]
    fn test_invariants_reject_zero_goal_and_zero_per_reps() {
        let mut req = base_request();
        req.rep_goal.insert("squats".to_string(), 0);
        assert!(req.check_invariants().is_err());

        let mut req = base_request();
        req.rep_reward
            .insert("squats".to_string(), RewardSpec::new(1.0, 0));
        assert!(req.check_invariants().is_err());
    }

    #[test]
    fn test_active_and_ended_windows() {
        let challenge = base_request().into_challenge(
            "c1".to_string(),
            "u1".to_string(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );

        let during = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        assert!(challenge.is_active(during));
        assert!(!challenge.is_ended(during));
        assert!(!challenge.is_active(after));
        assert!(challenge.is_ended(after));

        let mut flagged = challenge.clone();
        flagged.completed = true;
        assert!(!flagged.is_active(during));
        assert!(flagged.is_ended(during));
    }
}
