// SPDX-License-Identifier: MIT

//! Live exercise session tracking.
//!
//! A session is one continuous interval of webcam-tracked exercise. While
//! it runs, a worker task polls the motion detection service for fresh rep
//! batches (every 500 ms by default) and for availability (every 5 s).
//! Each batch is merged into session-local state synchronously and flushed
//! to the challenge store as a detached, additive increment, so the next
//! poll never waits on a submission. A failed flush keeps the optimistic local
//! count and records a warning; local counters are never rolled back.
//!
//! Closing a session drains the worker (one final poll with an awaited
//! flush) and re-reads authoritative challenge state to reconcile any
//! increments that landed after the last local snapshot.

use crate::config::Config;
use crate::db::ChallengeStore;
use crate::error::AppError;
use crate::models::Challenge;
use crate::services::motion::{MotionClient, SetTargetResponse};
use crate::services::rewards::{self, ChallengeProgress};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

const SESSION_ID_BYTES: usize = 12;

/// Session-local accumulation state.
///
/// Rep counts here are a fragment of total progress, so previews over them
/// are never goal-capped. They are kept separate from community aggregates
/// and only combined for display, never double-counted in storage.
#[derive(Debug)]
pub struct SessionState {
    pub challenge_id: String,
    pub user_id: String,
    pub target_exercise: Option<String>,
    /// exercise -> reps counted during this session
    pub rep_counts: HashMap<String, u64>,
    pub motion_available: bool,
    /// Increment submissions that failed; local counts stay optimistic
    pub flush_failures: u32,
    pub started_at: DateTime<Utc>,
}

impl SessionState {
    fn new(challenge_id: String, user_id: String) -> Self {
        Self {
            challenge_id,
            user_id,
            target_exercise: None,
            rep_counts: HashMap::new(),
            motion_available: false,
            flush_failures: 0,
            started_at: Utc::now(),
        }
    }

    /// Merge a polled rep batch into the session totals.
    pub fn merge_batch(&mut self, batch: &HashMap<String, u64>) {
        for (exercise, &count) in batch {
            if count > 0 {
                let total = self.rep_counts.entry(exercise.clone()).or_insert(0);
                *total = total.saturating_add(count);
            }
        }
    }

    /// Reward preview for session-local reps (uncapped).
    pub fn contribution_preview(&self, challenge: &Challenge) -> f64 {
        self.rep_counts
            .iter()
            .map(|(exercise, &reps)| {
                challenge
                    .rep_reward
                    .get(exercise)
                    .map(|&reward| rewards::contribution(reps, reward))
                    .unwrap_or(0.0)
            })
            .sum()
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub challenge_id: String,
    pub target_exercise: Option<String>,
    pub rep_counts: HashMap<String, u64>,
    /// Reward preview for this session alone (uncapped)
    pub session_contribution: f64,
    pub motion_available: bool,
    pub flush_failures: u32,
    pub started_at: DateTime<Utc>,
}

/// Final session summary plus reconciled challenge progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedSession {
    pub session: SessionSnapshot,
    /// Recomputed from authoritative store state after the worker drained
    pub progress: ChallengeProgress,
}

struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Manages live sessions and their polling workers.
#[derive(Clone)]
pub struct SessionService {
    store: ChallengeStore,
    motion: MotionClient,
    sessions: Arc<DashMap<String, Arc<SessionHandle>>>,
    rep_poll_interval: Duration,
    availability_poll_interval: Duration,
    rng: Arc<SystemRandom>,
}

impl SessionService {
    pub fn new(store: ChallengeStore, motion: MotionClient, config: &Config) -> Self {
        Self {
            store,
            motion,
            sessions: Arc::new(DashMap::new()),
            rep_poll_interval: Duration::from_millis(config.rep_poll_interval_ms),
            availability_poll_interval: Duration::from_secs(
                config.availability_poll_interval_secs,
            ),
            rng: Arc::new(SystemRandom::new()),
        }
    }

    fn new_session_id(&self) -> Result<String, AppError> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("failed to generate session id")))?;
        Ok(hex::encode(bytes))
    }

    fn get_handle(&self, session_id: &str) -> Result<Arc<SessionHandle>, AppError> {
        self.sessions
            .get(session_id)
            .map(|h| h.clone())
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))
    }

    /// Start a live tracking session for an enrolled user.
    pub fn start_session(&self, challenge_id: &str, user_id: &str) -> Result<String, AppError> {
        let challenge = self.store.get_challenge(challenge_id)?;
        if !challenge.is_enrolled(user_id) {
            return Err(AppError::BadRequest(
                "User must be enrolled to start a session".to_string(),
            ));
        }
        if challenge.is_ended(Utc::now()) {
            return Err(AppError::BadRequest(
                "Challenge has already ended".to_string(),
            ));
        }

        let session_id = self.new_session_id()?;
        let state = Arc::new(Mutex::new(SessionState::new(
            challenge_id.to_string(),
            user_id.to_string(),
        )));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(
            self.store.clone(),
            self.motion.clone(),
            state.clone(),
            shutdown_rx,
            self.rep_poll_interval,
            self.availability_poll_interval,
        ));

        self.sessions.insert(
            session_id.clone(),
            Arc::new(SessionHandle {
                state,
                shutdown: shutdown_tx,
                worker: Mutex::new(Some(worker)),
            }),
        );

        tracing::info!(session_id, challenge_id, user_id, "Session started");
        Ok(session_id)
    }

    /// Current session view, including the reward preview.
    pub async fn snapshot(&self, session_id: &str, user_id: &str) -> Result<SessionSnapshot, AppError> {
        let handle = self.get_handle(session_id)?;
        let state = handle.state.lock().await;
        if state.user_id != user_id {
            return Err(AppError::Forbidden(
                "Session belongs to another user".to_string(),
            ));
        }
        let challenge = self.store.get_challenge(&state.challenge_id)?;
        Ok(build_snapshot(session_id, &state, &challenge))
    }

    /// Select the exercise the motion service should count.
    ///
    /// Gated on the availability probe and on the challenge's enabled set.
    pub async fn set_target(
        &self,
        session_id: &str,
        user_id: &str,
        exercise: &str,
    ) -> Result<SetTargetResponse, AppError> {
        let handle = self.get_handle(session_id)?;

        let challenge_id = {
            let state = handle.state.lock().await;
            if state.user_id != user_id {
                return Err(AppError::Forbidden(
                    "Session belongs to another user".to_string(),
                ));
            }
            if !state.motion_available {
                return Err(AppError::MotionService(
                    "Motion detection service is unavailable".to_string(),
                ));
            }
            state.challenge_id.clone()
        };

        let challenge = self.store.get_challenge(&challenge_id)?;
        if !challenge.enabled_exercises.iter().any(|e| e == exercise) {
            return Err(AppError::BadRequest(format!(
                "Exercise '{}' is not enabled for this challenge",
                exercise
            )));
        }

        let response = self.motion.set_target(exercise).await?;
        if !response.success {
            return Err(AppError::MotionService(format!(
                "Service refused target '{}'",
                exercise
            )));
        }

        handle.state.lock().await.target_exercise = Some(exercise.to_string());
        tracing::info!(session_id, exercise, "Target exercise selected");
        Ok(response)
    }

    /// Close a session: drain the worker, then return the final session
    /// totals plus freshly recomputed challenge progress.
    pub async fn close(&self, session_id: &str, user_id: &str) -> Result<ClosedSession, AppError> {
        let handle = self.get_handle(session_id)?;
        {
            let state = handle.state.lock().await;
            if state.user_id != user_id {
                return Err(AppError::Forbidden(
                    "Session belongs to another user".to_string(),
                ));
            }
        }

        self.sessions.remove(session_id);
        let _ = handle.shutdown.send(true);
        if let Some(worker) = handle.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, session_id, "Session worker ended abnormally");
            }
        }

        let state = handle.state.lock().await;
        let challenge = self.store.get_challenge(&state.challenge_id)?;
        let snapshot = build_snapshot(session_id, &state, &challenge);
        let progress = rewards::progress(&challenge, Utc::now());

        tracing::info!(
            session_id,
            challenge_id = %state.challenge_id,
            flush_failures = state.flush_failures,
            "Session closed"
        );

        Ok(ClosedSession {
            session: snapshot,
            progress,
        })
    }
}

fn build_snapshot(session_id: &str, state: &SessionState, challenge: &Challenge) -> SessionSnapshot {
    SessionSnapshot {
        session_id: session_id.to_string(),
        challenge_id: state.challenge_id.clone(),
        target_exercise: state.target_exercise.clone(),
        rep_counts: state.rep_counts.clone(),
        session_contribution: state.contribution_preview(challenge),
        motion_available: state.motion_available,
        flush_failures: state.flush_failures,
        started_at: state.started_at,
    }
}

/// Polling loop: rep batches on the fast interval, availability on the
/// slow one, independent of each other. Exits on shutdown after a final
/// drain.
async fn run_worker(
    store: ChallengeStore,
    motion: MotionClient,
    state: Arc<Mutex<SessionState>>,
    mut shutdown: watch::Receiver<bool>,
    rep_poll_interval: Duration,
    availability_poll_interval: Duration,
) {
    let mut rep_tick = tokio::time::interval(rep_poll_interval);
    let mut avail_tick = tokio::time::interval(availability_poll_interval);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                drain(&store, &motion, &state).await;
                break;
            }
            _ = rep_tick.tick() => {
                poll_once(&store, &motion, &state).await;
            }
            _ = avail_tick.tick() => {
                let available = motion.check_availability().await;
                state.lock().await.motion_available = available;
            }
        }
    }
}

/// One rep poll: merge the batch locally, flush it as a detached task.
async fn poll_once(store: &ChallengeStore, motion: &MotionClient, state: &Arc<Mutex<SessionState>>) {
    let batch = match motion.poll_reps().await {
        Ok(batch) => batch,
        Err(e) => {
            // Transient: re-polled on the next tick
            tracing::debug!(error = %e, "Rep poll failed");
            return;
        }
    };
    if batch.values().all(|&count| count == 0) {
        return;
    }

    let (challenge_id, user_id) = {
        let mut state = state.lock().await;
        state.merge_batch(&batch);
        (state.challenge_id.clone(), state.user_id.clone())
    };

    // The next poll must not wait on this submission, so it runs detached.
    // Deltas are additive, never absolute, so out-of-order completion
    // cannot lose or duplicate reps.
    let store = store.clone();
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = store.increment_contributions(&challenge_id, &user_id, &batch) {
            tracing::warn!(
                error = %e,
                challenge_id,
                "Failed to flush rep increments; keeping local counts"
            );
            state.lock().await.flush_failures += 1;
        }
    });
}

/// Final poll on shutdown, with the flush awaited so the close handler
/// reads store state that includes it.
async fn drain(store: &ChallengeStore, motion: &MotionClient, state: &Arc<Mutex<SessionState>>) {
    let Ok(batch) = motion.poll_reps().await else {
        return;
    };
    if batch.values().all(|&count| count == 0) {
        return;
    }

    let (challenge_id, user_id) = {
        let mut state = state.lock().await;
        state.merge_batch(&batch);
        (state.challenge_id.clone(), state.user_id.clone())
    };

    if let Err(e) = store.increment_contributions(&challenge_id, &user_id, &batch) {
        tracing::warn!(
            error = %e,
            challenge_id,
            "Failed to flush final rep increments"
        );
        state.lock().await.flush_failures += 1;
    }
}
