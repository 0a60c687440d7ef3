// SPDX-License-Identifier: MIT

//! User model for storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account stored in the challenge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Opaque user id (also the storage key)
    pub id: String,
    /// Display name
    pub username: String,
    /// Email address, unique per account
    pub email: String,
    /// PBKDF2 password hash ("salt$hash", hex)
    pub password_hash: String,
    /// Challenge ids the user is enrolled in
    pub enrolled_challenges: Vec<String>,
    pub created_at: DateTime<Utc>,
}
