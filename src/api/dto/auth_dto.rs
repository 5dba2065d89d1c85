//! Account and session DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Session, SessionId, UserId, UserRecord};

/// Request body for `POST /register` and `POST /login`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CredentialsRequest {
    /// Account email.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

/// Response for a successful register or login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    /// Human-readable outcome.
    pub message: String,
    /// The logged-in account's email.
    pub user: String,
}

/// Response carrying only a status message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl MessageResponse {
    /// Wraps `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response for `GET /dashboard`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    /// The caller's email.
    pub email: String,
}

/// Session as exposed by `GET /session`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionDto {
    /// Session id.
    pub session_id: SessionId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionDto {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

/// Public view of an account. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserDto {
    /// Account id.
    pub id: UserId,
    /// Account email.
    pub email: String,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserDto {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

/// Response for `GET /session`. Both fields are `null` for anonymous
/// callers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionInfoResponse {
    /// The caller's session.
    pub session: Option<SessionDto>,
    /// The caller's account.
    pub user: Option<UserDto>,
}
