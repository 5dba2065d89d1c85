//! User accounts and the principal view bound to a live connection.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::UserId;

/// A stored user account.
///
/// The password hash is a PHC string produced by
/// [`crate::auth::password::hash_password`]; it never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Unique account identifier (immutable).
    pub id: UserId,
    /// Login email, also used as the display label in chat.
    pub email: String,
    /// Argon2 PHC hash of the password.
    pub password_hash: String,
    /// Account creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Creates a new account record with a fresh id.
    #[must_use]
    pub fn new(email: String, password_hash: String) -> Self {
        Self {
            id: UserId::new(),
            email,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

/// The authenticated identity bound to a connection at admission.
///
/// Carries only what the chat relay needs: the account id used as the
/// sender id and the label shown to other participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Account id of the authenticated user.
    pub user_id: UserId,
    /// Display label (the account email).
    pub label: String,
}

impl From<&UserRecord> for Principal {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.id,
            label: user.email.clone(),
        }
    }
}
