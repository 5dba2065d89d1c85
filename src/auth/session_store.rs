//! Session store: opens, looks up, and destroys login sessions.

use chrono::{Duration, Utc};

use crate::domain::{Session, SessionId, UserId};
use crate::error::GatewayError;
use crate::persistence::Persistence;

/// Login sessions keyed by session id.
#[derive(Debug, Clone)]
pub struct SessionStore {
    persistence: Persistence,
    ttl: Duration,
}

impl SessionStore {
    /// Creates a store whose new sessions live for `ttl`.
    #[must_use]
    pub fn new(persistence: Persistence, ttl: Duration) -> Self {
        Self { persistence, ttl }
    }

    /// Lifetime given to new sessions.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Opens and stores a new session for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on store failure.
    pub async fn open(&self, user_id: UserId) -> Result<Session, GatewayError> {
        let session = Session::open(user_id, self.ttl);
        self.persistence.insert_session(&session).await?;
        tracing::debug!(%user_id, session_id = %session.session_id, "session opened");
        Ok(session)
    }

    /// Looks a session up. Expired sessions are returned as-is; callers
    /// decide how to treat them.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on store failure.
    pub async fn lookup(&self, session_id: SessionId) -> Result<Option<Session>, GatewayError> {
        self.persistence.find_session(session_id).await
    }

    /// Destroys a session. Destroying an unknown session is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on store failure.
    pub async fn destroy(&self, session_id: SessionId) -> Result<(), GatewayError> {
        if self.persistence.delete_session(session_id).await? {
            tracing::debug!(%session_id, "session destroyed");
        }
        Ok(())
    }

    /// Deletes every expired session, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on store failure.
    pub async fn purge_expired(&self) -> Result<u64, GatewayError> {
        self.persistence.delete_expired_sessions(Utc::now()).await
    }

    /// Spawns a task that purges expired sessions every `period`.
    #[must_use]
    pub fn spawn_reaper(self, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match self.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "expired sessions purged"),
                    Err(e) => tracing::warn!(error = %e, "session purge failed"),
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_then_lookup() {
        let store = SessionStore::new(Persistence::in_memory(), Duration::hours(1));
        let user_id = UserId::new();
        let Ok(session) = store.open(user_id).await else {
            panic!("open failed");
        };

        let Ok(Some(found)) = store.lookup(session.session_id).await else {
            panic!("session should be found");
        };
        assert_eq!(found.user_id, user_id);
        assert_eq!(found.expires_at - found.created_at, Duration::hours(1));
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let store = SessionStore::new(Persistence::in_memory(), Duration::hours(1));
        let Ok(session) = store.open(UserId::new()).await else {
            panic!("open failed");
        };

        assert!(store.destroy(session.session_id).await.is_ok());
        assert!(store.destroy(session.session_id).await.is_ok());
        assert!(matches!(store.lookup(session.session_id).await, Ok(None)));
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let persistence = Persistence::in_memory();
        let short = SessionStore::new(persistence.clone(), Duration::zero());
        let long = SessionStore::new(persistence, Duration::hours(1));

        let Ok(dead) = short.open(UserId::new()).await else {
            panic!("open failed");
        };
        let Ok(live) = long.open(UserId::new()).await else {
            panic!("open failed");
        };

        assert!(matches!(long.purge_expired().await, Ok(1)));
        assert!(matches!(long.lookup(dead.session_id).await, Ok(None)));
        assert!(matches!(long.lookup(live.session_id).await, Ok(Some(_))));
    }
}
