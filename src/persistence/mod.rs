//! Persistence layer: user accounts and login sessions.
//!
//! [`Persistence`] selects the backend once at startup. The in-memory
//! backend serves development and tests; the PostgreSQL backend keeps
//! accounts and sessions across restarts.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use postgres::PostgresPersistence;

use crate::domain::{Session, SessionId, UserId, UserRecord};
use crate::error::GatewayError;

/// Backend for users and sessions.
///
/// Cloning is cheap: both variants share their underlying state.
#[derive(Debug, Clone)]
pub enum Persistence {
    /// Process-local maps.
    Memory(MemoryStore),
    /// PostgreSQL via `sqlx`.
    Postgres(PostgresPersistence),
}

impl Persistence {
    /// Returns an empty in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    /// Inserts a new user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserExists`] if the email is taken, or a
    /// [`GatewayError::PersistenceError`] on database failure.
    pub async fn insert_user(&self, user: &UserRecord) -> Result<(), GatewayError> {
        match self {
            Self::Memory(store) => store.insert_user(user).await,
            Self::Postgres(pg) => pg.insert_user(user).await,
        }
    }

    /// Looks a user up by email.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, GatewayError> {
        match self {
            Self::Memory(store) => Ok(store.find_user_by_email(email).await),
            Self::Postgres(pg) => pg.find_user_by_email(email).await,
        }
    }

    /// Looks a user up by id.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn find_user_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, GatewayError> {
        match self {
            Self::Memory(store) => Ok(store.find_user_by_id(user_id).await),
            Self::Postgres(pg) => pg.find_user_by_id(user_id).await,
        }
    }

    /// Deletes a user together with its sessions.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn delete_user(&self, user_id: UserId) -> Result<bool, GatewayError> {
        match self {
            Self::Memory(store) => Ok(store.delete_user(user_id).await),
            Self::Postgres(pg) => pg.delete_user(user_id).await,
        }
    }

    /// Stores a session.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn insert_session(&self, session: &Session) -> Result<(), GatewayError> {
        match self {
            Self::Memory(store) => {
                store.insert_session(session).await;
                Ok(())
            }
            Self::Postgres(pg) => pg.insert_session(session).await,
        }
    }

    /// Looks a session up by id, expired or not.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn find_session(&self, session_id: SessionId) -> Result<Option<Session>, GatewayError> {
        match self {
            Self::Memory(store) => Ok(store.find_session(session_id).await),
            Self::Postgres(pg) => pg.find_session(session_id).await,
        }
    }

    /// Deletes a session.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<bool, GatewayError> {
        match self {
            Self::Memory(store) => Ok(store.delete_session(session_id).await),
            Self::Postgres(pg) => pg.delete_session(session_id).await,
        }
    }

    /// Deletes every session expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, GatewayError> {
        match self {
            Self::Memory(store) => Ok(store.delete_expired_sessions(now).await),
            Self::Postgres(pg) => pg.delete_expired_sessions(now).await,
        }
    }
}
