// src/models/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Represents the 'users' table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,

    pub register_no: String,

    /// Argon2 password hash; `None` until the student sets a password.
    /// Skipped during serialization to prevent leaking it.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,

    #[serde(default)]
    pub student_name: Option<String>,

    #[serde(default)]
    pub is_admin: bool,
}

/// Represents the 'sessions' table: an opaque token bound to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Lightweight identity the client keeps next to its token.
/// Only trusted for an optimistic first paint; the guard rewrites it from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    pub user_id: Uuid,
    pub register_no: String,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
}

impl From<&User> for IdentityClaim {
    fn from(user: &User) -> Self {
        IdentityClaim {
            user_id: user.id,
            register_no: user.register_no.clone(),
            student_name: user.student_name.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// DTO for the first login step.
#[derive(Debug, Deserialize, Validate)]
pub struct LookupRequest {
    #[validate(length(min = 1, max = 50))]
    pub register_no: String,
}

/// DTO for setting the password of a provisioned student.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePasswordRequest {
    #[validate(length(min = 1, max = 50))]
    pub register_no: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be at least 8 characters"
    ))]
    pub password: String,
    pub confirm_password: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub register_no: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for an administrator provisioning a student.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 50))]
    pub register_no: String,
    #[validate(length(max = 100))]
    pub student_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
    pub user: IdentityClaim,
}
