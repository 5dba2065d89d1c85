//! PostgreSQL implementation of the user and session store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::domain::{Session, SessionId, UserId, UserRecord};
use crate::error::GatewayError;

/// Unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

type UserRow = (Uuid, String, String, DateTime<Utc>);
type SessionRow = (Uuid, Uuid, DateTime<Utc>, DateTime<Utc>);

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `config.database_url` and applies the embedded
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::PersistenceError`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| GatewayError::PersistenceError(e.to_string()))?;

        tracing::info!("postgres persistence ready");
        Ok(Self::new(pool))
    }

    /// Inserts a new user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserExists`] if the email is taken and
    /// [`GatewayError::PersistenceError`] on any other database failure.
    pub async fn insert_user(&self, user: &UserRecord) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::from(user.id))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                GatewayError::UserExists
            } else {
                GatewayError::from(e)
            }
        })?;
        Ok(())
    }

    /// Looks a user up by email.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, GatewayError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    /// Looks a user up by id.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn find_user_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, GatewayError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    /// Deletes a user; its sessions go with it (`ON DELETE CASCADE`).
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn delete_user(&self, user_id: UserId) -> Result<bool, GatewayError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(Uuid::from(user_id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stores a session.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn insert_session(&self, session: &Session) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::from(session.session_id))
        .bind(Uuid::from(session.user_id))
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Looks a session up by id, expired or not.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn find_session(&self, session_id: SessionId) -> Result<Option<Session>, GatewayError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = $1",
        )
        .bind(Uuid::from(session_id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, user_id, created_at, expires_at)| Session {
            session_id: SessionId::from_uuid(id),
            user_id: UserId::from_uuid(user_id),
            created_at,
            expires_at,
        }))
    }

    /// Deletes a session.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<bool, GatewayError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(Uuid::from(session_id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every session expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on database failure.
    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, GatewayError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

fn user_from_row((id, email, password_hash, created_at): UserRow) -> UserRecord {
    UserRecord {
        id: UserId::from_uuid(id),
        email,
        password_hash,
        created_at,
    }
}
