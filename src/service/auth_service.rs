//! Account service: registration, login (password or external identity),
//! logout, and account deletion.

use std::sync::Arc;

use axum::extract::ws::close_code;

use crate::auth::SessionStore;
use crate::auth::password::{hash_password, verify_password};
use crate::domain::{ConnectionRegistry, Recipient, Session, SessionId, UserRecord};
use crate::error::GatewayError;
use crate::persistence::Persistence;

/// Longest accepted email, per RFC 5321.
const MAX_EMAIL_LEN: usize = 254;
/// Longest accepted password, in bytes.
const MAX_PASSWORD_LEN: usize = 1024;
/// Stored for accounts created from an external identity. Not a PHC
/// string, so no password ever verifies against it.
const EXTERNAL_ACCOUNT_HASH: &str = "!external";

/// Orchestration layer for account operations.
///
/// Every successful register or login opens a fresh session; the caller
/// turns it into a cookie.
#[derive(Debug, Clone)]
pub struct AuthService {
    persistence: Persistence,
    sessions: SessionStore,
    registry: Arc<ConnectionRegistry>,
}

impl AuthService {
    /// Creates a new `AuthService`.
    #[must_use]
    pub fn new(
        persistence: Persistence,
        sessions: SessionStore,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            persistence,
            sessions,
            registry,
        }
    }

    /// Returns the session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Creates an account and logs it in.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for an unusable email or
    /// password, [`GatewayError::UserExists`] if the email is taken, or a
    /// store error.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(UserRecord, Session), GatewayError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        if self.persistence.find_user_by_email(&email).await?.is_some() {
            return Err(GatewayError::UserExists);
        }

        let hash = hash_password(password.to_string()).await?;
        let user = UserRecord::new(email, hash);
        self.persistence.insert_user(&user).await?;
        let session = self.sessions.open(user.id).await?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok((user, session))
    }

    /// Verifies credentials and opens a session.
    ///
    /// Unknown email and wrong password are reported identically.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidCredentials`] on mismatch, or a store
    /// error.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(UserRecord, Session), GatewayError> {
        let email = normalize_email(email).map_err(|_| GatewayError::InvalidCredentials)?;

        let Some(user) = self.persistence.find_user_by_email(&email).await? else {
            tracing::debug!("login for unknown email");
            return Err(GatewayError::InvalidCredentials);
        };

        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            tracing::debug!(user_id = %user.id, "login with wrong password");
            return Err(GatewayError::InvalidCredentials);
        }

        let session = self.sessions.open(user.id).await?;
        tracing::info!(user_id = %user.id, "user logged in");
        Ok((user, session))
    }

    /// Finds or creates the account for an email verified by an external
    /// identity provider, and opens a session for it.
    ///
    /// Accounts created here cannot log in with a password.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for an unusable email, or a
    /// store error.
    pub async fn login_external(&self, email: &str) -> Result<(UserRecord, Session), GatewayError> {
        let email = normalize_email(email)?;

        let user = match self.persistence.find_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                let user = UserRecord::new(email.clone(), EXTERNAL_ACCOUNT_HASH.to_string());
                match self.persistence.insert_user(&user).await {
                    Ok(()) => {
                        tracing::info!(user_id = %user.id, "user created from external identity");
                        user
                    }
                    // Lost a race with a concurrent first login.
                    Err(GatewayError::UserExists) => self
                        .persistence
                        .find_user_by_email(&email)
                        .await?
                        .ok_or_else(|| GatewayError::Internal("account vanished".to_string()))?,
                    Err(e) => return Err(e),
                }
            }
        };

        let session = self.sessions.open(user.id).await?;
        tracing::info!(user_id = %user.id, "user logged in with external identity");
        Ok((user, session))
    }

    /// Destroys a session and closes every chat connection admitted under
    /// it. Unknown sessions are ignored. Returns the number of connections
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn logout(&self, session_id: SessionId) -> Result<usize, GatewayError> {
        self.sessions.destroy(session_id).await?;

        let evicted = self.registry.evict_session(session_id).await;
        close_all(&evicted, "logged out");
        Ok(evicted.len())
    }

    /// Deletes an account with its sessions and closes every chat connection
    /// it holds. Returns the number of connections closed.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn delete_account(&self, user: &UserRecord) -> Result<usize, GatewayError> {
        self.persistence.delete_user(user.id).await?;

        let evicted = self.registry.evict_principal(user.id).await;
        close_all(&evicted, "account deleted");

        tracing::info!(user_id = %user.id, connections = evicted.len(), "account deleted");
        Ok(evicted.len())
    }
}

fn close_all(recipients: &[Recipient], reason: &'static str) {
    for recipient in recipients {
        recipient.close(close_code::POLICY, reason);
    }
}

fn normalize_email(raw: &str) -> Result<String, GatewayError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(GatewayError::InvalidRequest("username is required".to_string()));
    }
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(GatewayError::InvalidRequest("invalid username".to_string()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), GatewayError> {
    if password.is_empty() {
        return Err(GatewayError::InvalidRequest("password is required".to_string()));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(GatewayError::InvalidRequest("password too long".to_string()));
    }
    Ok(())
}
