// SPDX-License-Identifier: MIT

//! HTTP client for the external motion detection service.
//!
//! The service watches the webcam, counts reps for the selected target
//! exercise and exposes three endpoints:
//! - `GET /reps/process`: reps counted since the previous call. The service
//!   resets its counters on read, so each batch must be consumed exactly
//!   once and never re-requested.
//! - `POST /target`: select the exercise to count.
//! - `GET /health`: availability probe.

use crate::error::AppError;
use serde::Deserialize;
use std::collections::HashMap;

/// Motion detection service client.
#[derive(Clone)]
pub struct MotionClient {
    /// None in mock mode (offline tests)
    http: Option<reqwest::Client>,
    base_url: String,
}

/// Response from selecting a target exercise.
#[derive(Debug, Clone, Deserialize)]
pub struct SetTargetResponse {
    pub success: bool,
    pub target: String,
}

impl MotionClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Some(reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a mock client for testing (offline mode).
    ///
    /// Reports the service as unavailable and returns empty rep batches.
    pub fn new_mock() -> Self {
        Self {
            http: None,
            base_url: String::new(),
        }
    }

    fn get_client(&self) -> Result<&reqwest::Client, AppError> {
        self.http.as_ref().ok_or_else(|| {
            AppError::MotionService("Motion detection service not configured".to_string())
        })
    }

    /// Select the exercise the service should count.
    pub async fn set_target(&self, exercise: &str) -> Result<SetTargetResponse, AppError> {
        let url = format!("{}/target", self.base_url);
        let body = serde_json::json!({ "target": exercise });

        let response = self
            .get_client()?
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::MotionService(e.to_string()))?;

        Self::check_response_json(response).await
    }

    /// Fetch reps counted since the previous call.
    ///
    /// Destructive read: the service zeroes its counters when it responds,
    /// so the returned batch is an at-most-once delta.
    pub async fn poll_reps(&self) -> Result<HashMap<String, u64>, AppError> {
        let Some(http) = self.http.as_ref() else {
            return Ok(HashMap::new());
        };

        let url = format!("{}/reps/process", self.base_url);
        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::MotionService(e.to_string()))?;

        Self::check_response_json(response).await
    }

    /// Probe whether the service is reachable and healthy.
    pub async fn check_availability(&self) -> bool {
        let Some(http) = self.http.as_ref() else {
            return false;
        };

        let url = format!("{}/health", self.base_url);
        match http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::MotionService(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::MotionService(format!("Invalid response body: {}", e)))
    }
}
