// SPDX-License-Identifier: MIT

//! In-memory challenge store with typed operations.
//!
//! Provides high-level operations for:
//! - Users (account storage)
//! - Challenges (lifecycle, enrollment)
//! - Contributions (additive rep increments)
//!
//! Increments are additive deltas, never absolute overwrites, so
//! out-of-order flushes from concurrent sessions cannot lose or duplicate
//! reps.

use crate::error::AppError;
use crate::models::{Challenge, User};
use crate::services::rewards;
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::sync::Arc;

const ID_BYTES: usize = 12;

/// Result of applying a contribution increment.
#[derive(Debug, Clone)]
pub struct IncrementOutcome {
    /// Deltas applied, per enabled exercise
    pub applied: HashMap<String, u64>,
    /// Deltas dropped because the exercise is not enabled for the challenge
    pub ignored: HashMap<String, u64>,
    /// Whether this increment pushed every goal over the line
    pub completed_now: bool,
}

/// Concurrency-safe in-memory store for challenges and users.
#[derive(Clone)]
pub struct ChallengeStore {
    challenges: Arc<DashMap<String, Challenge>>,
    users: Arc<DashMap<String, User>>,
    rng: Arc<SystemRandom>,
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self {
            challenges: Arc::new(DashMap::new()),
            users: Arc::new(DashMap::new()),
            rng: Arc::new(SystemRandom::new()),
        }
    }

    fn new_id(&self) -> Result<String, AppError> {
        let mut bytes = [0u8; ID_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("failed to generate id")))?;
        Ok(hex::encode(bytes))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Create a user. Fails if the email is already registered.
    pub fn create_user(
        &self,
        username: String,
        email: String,
        password_hash: String,
    ) -> Result<String, AppError> {
        if self.find_user_by_email(&email).is_some() {
            return Err(AppError::BadRequest("Email already registered".to_string()));
        }

        let id = self.new_id()?;
        let user = User {
            id: id.clone(),
            username,
            email,
            password_hash,
            enrolled_challenges: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        self.users.insert(id.clone(), user);
        Ok(id)
    }

    pub fn get_user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|u| u.clone())
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|entry| entry.email == email)
            .map(|entry| entry.clone())
    }

    // ─── Challenge Operations ────────────────────────────────────

    pub fn create_challenge(&self, challenge: Challenge) -> String {
        let id = challenge.id.clone();
        self.challenges.insert(id.clone(), challenge);
        id
    }

    /// Allocate a fresh challenge id.
    pub fn next_challenge_id(&self) -> Result<String, AppError> {
        self.new_id()
    }

    pub fn get_challenge(&self, challenge_id: &str) -> Result<Challenge, AppError> {
        self.challenges
            .get(challenge_id)
            .map(|c| c.clone())
            .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", challenge_id)))
    }

    pub fn list_challenges(&self) -> Vec<Challenge> {
        let mut all: Vec<Challenge> = self.challenges.iter().map(|c| c.clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    /// Challenges created by the user or where the user participates.
    pub fn list_mine(&self, user_id: &str) -> Vec<Challenge> {
        self.list_challenges()
            .into_iter()
            .filter(|c| c.creator_user_id == user_id || c.is_enrolled(user_id))
            .collect()
    }

    /// Challenges where the user is enrolled.
    pub fn list_enrolled(&self, user_id: &str) -> Vec<Challenge> {
        self.list_challenges()
            .into_iter()
            .filter(|c| c.is_enrolled(user_id))
            .collect()
    }

    /// Delete a challenge. Only the creator may delete; enrollment records
    /// on every participant are cleaned up.
    pub fn delete_challenge(&self, challenge_id: &str, requesting_user: &str) -> Result<(), AppError> {
        let participants = {
            let challenge = self
                .challenges
                .get(challenge_id)
                .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", challenge_id)))?;

            if challenge.creator_user_id != requesting_user {
                return Err(AppError::Forbidden(
                    "Only the creator can delete a challenge".to_string(),
                ));
            }
            challenge.participants.clone()
        };

        for participant in &participants {
            if let Some(mut user) = self.users.get_mut(participant) {
                user.enrolled_challenges.retain(|c| c != challenge_id);
            }
        }

        self.challenges.remove(challenge_id);
        tracing::info!(challenge_id, "Challenge deleted");
        Ok(())
    }

    // ─── Enrollment ──────────────────────────────────────────────

    /// Enroll a user; seeds an empty contribution record.
    pub fn enroll(&self, challenge_id: &str, user_id: &str) -> Result<(), AppError> {
        {
            let mut challenge = self
                .challenges
                .get_mut(challenge_id)
                .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", challenge_id)))?;

            if challenge.is_enrolled(user_id) {
                return Err(AppError::BadRequest(
                    "User already enrolled in this challenge".to_string(),
                ));
            }

            challenge.participants.push(user_id.to_string());
            challenge
                .contributions
                .entry(user_id.to_string())
                .or_default();
        }

        if let Some(mut user) = self.users.get_mut(user_id) {
            if !user.enrolled_challenges.iter().any(|c| c == challenge_id) {
                user.enrolled_challenges.push(challenge_id.to_string());
            }
        }
        Ok(())
    }

    /// Unenroll a user. Removes the user's entire contribution record:
    /// leaving a challenge forfeits progress, not merely membership.
    pub fn unenroll(&self, challenge_id: &str, user_id: &str) -> Result<(), AppError> {
        {
            let mut challenge = self
                .challenges
                .get_mut(challenge_id)
                .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", challenge_id)))?;

            if !challenge.is_enrolled(user_id) {
                return Err(AppError::BadRequest(
                    "User not enrolled in this challenge".to_string(),
                ));
            }

            challenge.participants.retain(|p| p != user_id);
            challenge.contributions.remove(user_id);
        }

        if let Some(mut user) = self.users.get_mut(user_id) {
            user.enrolled_challenges.retain(|c| c != challenge_id);
        }
        Ok(())
    }

    // ─── Contributions ───────────────────────────────────────────

    /// Atomically add rep deltas to a user's contribution record.
    ///
    /// Only positive deltas for enabled exercises are applied; the rest are
    /// reported back as ignored. When the increment pushes every enabled
    /// exercise past its goal, the challenge is flagged completed.
    pub fn increment_contributions(
        &self,
        challenge_id: &str,
        user_id: &str,
        increments: &HashMap<String, u64>,
    ) -> Result<IncrementOutcome, AppError> {
        let mut challenge = self
            .challenges
            .get_mut(challenge_id)
            .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", challenge_id)))?;

        let mut applied = HashMap::new();
        let mut ignored = HashMap::new();

        for (exercise, &delta) in increments {
            if delta == 0 {
                continue;
            }
            if challenge.enabled_exercises.iter().any(|e| e == exercise) {
                applied.insert(exercise.clone(), delta);
            } else {
                tracing::warn!(
                    challenge_id,
                    exercise,
                    delta,
                    "Ignoring increment for exercise not enabled by challenge"
                );
                ignored.insert(exercise.clone(), delta);
            }
        }

        let user_record = challenge
            .contributions
            .entry(user_id.to_string())
            .or_default();
        for (exercise, &delta) in &applied {
            // Deltas come from the request body; saturate instead of
            // overflowing on absurd values.
            let count = user_record.entry(exercise.clone()).or_insert(0);
            *count = count.saturating_add(delta);
        }

        // Flag completion once every enabled exercise meets its goal.
        // Uses uncapped actual totals, the same evaluation the status
        // tri-state uses.
        let mut completed_now = false;
        if !challenge.completed && rewards::all_goals_met(&challenge) {
            challenge.completed = true;
            completed_now = true;
            tracing::info!(challenge_id, "Challenge completed: all goals met");
        }

        Ok(IncrementOutcome {
            applied,
            ignored,
            completed_now,
        })
    }

    /// A user's contribution map with every enabled exercise present
    /// (zero-filled).
    pub fn get_contributions(
        &self,
        challenge_id: &str,
        user_id: &str,
    ) -> Result<HashMap<String, u64>, AppError> {
        let challenge = self.get_challenge(challenge_id)?;
        let mut contributions = challenge
            .contributions
            .get(user_id)
            .cloned()
            .unwrap_or_default();
        for exercise in &challenge.enabled_exercises {
            contributions.entry(exercise.clone()).or_insert(0);
        }
        Ok(contributions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateChallengeRequest, RewardSpec};
    use chrono::{TimeZone, Utc};

    fn seed_challenge(store: &ChallengeStore, creator: &str, goal: u64) -> String {
        let request = CreateChallengeRequest {
            name: "Test".to_string(),
            description: String::new(),
            enabled_exercises: vec!["squats".to_string(), "jumping_jacks".to_string()],
            rep_goal: HashMap::from([
                ("squats".to_string(), goal),
                ("jumping_jacks".to_string(), goal),
            ]),
            rep_reward: HashMap::from([
                ("squats".to_string(), RewardSpec::new(1.0, 50)),
                ("jumping_jacks".to_string(), RewardSpec::new(1.0, 50)),
            ]),
            rep_reward_type: "trees planted".to_string(),
            completion_reward: "A forest".to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap(),
        };
        let id = store.next_challenge_id().unwrap();
        store.create_challenge(request.into_challenge(
            id.clone(),
            creator.to_string(),
            Utc::now(),
        ));
        id
    }

    #[test]
    fn test_create_user_rejects_duplicate_email() {
        let store = ChallengeStore::new();
        store
            .create_user("a".into(), "a@example.com".into(), "hash".into())
            .unwrap();
        let err = store
            .create_user("b".into(), "a@example.com".into(), "hash".into())
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_enroll_and_double_enroll() {
        let store = ChallengeStore::new();
        let user = store
            .create_user("a".into(), "a@example.com".into(), "hash".into())
            .unwrap();
        let challenge_id = seed_challenge(&store, "creator", 100);

        store.enroll(&challenge_id, &user).unwrap();
        let challenge = store.get_challenge(&challenge_id).unwrap();
        assert!(challenge.is_enrolled(&user));
        assert!(challenge.contributions.contains_key(&user));
        assert_eq!(
            store.get_user(&user).unwrap().enrolled_challenges,
            vec![challenge_id.clone()]
        );

        let err = store.enroll(&challenge_id, &user).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_unenroll_forfeits_contributions() {
        // Scenario E: leaving removes the entire contribution record
        let store = ChallengeStore::new();
        let user = store
            .create_user("a".into(), "a@example.com".into(), "hash".into())
            .unwrap();
        let challenge_id = seed_challenge(&store, "creator", 1000);

        store.enroll(&challenge_id, &user).unwrap();
        store
            .increment_contributions(
                &challenge_id,
                &user,
                &HashMap::from([("squats".to_string(), 300)]),
            )
            .unwrap();

        store.unenroll(&challenge_id, &user).unwrap();
        let challenge = store.get_challenge(&challenge_id).unwrap();
        assert!(!challenge.contributions.contains_key(&user));
        assert!(!challenge.is_enrolled(&user));
        assert_eq!(rewards::actual_reps(&challenge).get("squats"), Some(&0));
    }

    #[test]
    fn test_increment_ignores_disabled_exercises() {
        let store = ChallengeStore::new();
        let challenge_id = seed_challenge(&store, "creator", 1000);

        let outcome = store
            .increment_contributions(
                &challenge_id,
                "u1",
                &HashMap::from([
                    ("squats".to_string(), 10),
                    ("pushups".to_string(), 7),
                    ("jumping_jacks".to_string(), 0),
                ]),
            )
            .unwrap();

        assert_eq!(outcome.applied, HashMap::from([("squats".to_string(), 10)]));
        assert_eq!(outcome.ignored, HashMap::from([("pushups".to_string(), 7)]));
        assert!(!outcome.completed_now);
    }

    #[test]
    fn test_increments_are_additive() {
        let store = ChallengeStore::new();
        let challenge_id = seed_challenge(&store, "creator", 1000);

        for _ in 0..3 {
            store
                .increment_contributions(
                    &challenge_id,
                    "u1",
                    &HashMap::from([("squats".to_string(), 5)]),
                )
                .unwrap();
        }

        let challenge = store.get_challenge(&challenge_id).unwrap();
        assert_eq!(challenge.contributions["u1"]["squats"], 15);
    }

    #[test]
    fn test_increments_saturate_instead_of_overflowing() {
        let store = ChallengeStore::new();
        let challenge_id = seed_challenge(&store, "creator", 1000);

        for _ in 0..2 {
            store
                .increment_contributions(
                    &challenge_id,
                    "u1",
                    &HashMap::from([("squats".to_string(), u64::MAX)]),
                )
                .unwrap();
        }

        let challenge = store.get_challenge(&challenge_id).unwrap();
        assert_eq!(challenge.contributions["u1"]["squats"], u64::MAX);
    }

    #[test]
    fn test_increment_flags_completion_when_all_goals_met() {
        let store = ChallengeStore::new();
        let challenge_id = seed_challenge(&store, "creator", 10);

        let outcome = store
            .increment_contributions(
                &challenge_id,
                "u1",
                &HashMap::from([("squats".to_string(), 10)]),
            )
            .unwrap();
        assert!(!outcome.completed_now);

        let outcome = store
            .increment_contributions(
                &challenge_id,
                "u2",
                &HashMap::from([("jumping_jacks".to_string(), 25)]),
            )
            .unwrap();
        assert!(outcome.completed_now);
        assert!(store.get_challenge(&challenge_id).unwrap().completed);
    }

    #[test]
    fn test_delete_challenge_owner_only() {
        let store = ChallengeStore::new();
        let user = store
            .create_user("a".into(), "a@example.com".into(), "hash".into())
            .unwrap();
        let challenge_id = seed_challenge(&store, "creator", 100);
        store.enroll(&challenge_id, &user).unwrap();

        let err = store.delete_challenge(&challenge_id, &user).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        store.delete_challenge(&challenge_id, "creator").unwrap();
        assert!(store.get_challenge(&challenge_id).is_err());
        assert!(store.get_user(&user).unwrap().enrolled_challenges.is_empty());
    }

    #[test]
    fn test_get_contributions_zero_fills_enabled_exercises() {
        let store = ChallengeStore::new();
        let challenge_id = seed_challenge(&store, "creator", 100);
        store
            .increment_contributions(
                &challenge_id,
                "u1",
                &HashMap::from([("squats".to_string(), 3)]),
            )
            .unwrap();

        let contributions = store.get_contributions(&challenge_id, "u1").unwrap();
        assert_eq!(contributions["squats"], 3);
        assert_eq!(contributions["jumping_jacks"], 0);
    }
}
