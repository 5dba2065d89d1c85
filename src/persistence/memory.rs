//! In-memory user and session store.
//!
//! The default backend when persistence is disabled, and the backend every
//! test runs against. State lives for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{Session, SessionId, UserId, UserRecord};
use crate::error::GatewayError;

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, UserRecord>,
    emails: HashMap<String, UserId>,
    sessions: HashMap<SessionId, Session>,
}

/// Process-local store backed by `HashMap`s behind one [`RwLock`].
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::UserExists`] if the email is taken.
    pub async fn insert_user(&self, user: &UserRecord) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        if state.emails.contains_key(&user.email) {
            return Err(GatewayError::UserExists);
        }
        state.emails.insert(user.email.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    /// Looks a user up by email.
    pub async fn find_user_by_email(&self, email: &str) -> Option<UserRecord> {
        let state = self.state.read().await;
        state
            .emails
            .get(email)
            .and_then(|id| state.users.get(id))
            .cloned()
    }

    /// Looks a user up by id.
    pub async fn find_user_by_id(&self, user_id: UserId) -> Option<UserRecord> {
        self.state.read().await.users.get(&user_id).cloned()
    }

    /// Deletes a user and every session it owns. Returns `true` if the
    /// user existed.
    pub async fn delete_user(&self, user_id: UserId) -> bool {
        let mut state = self.state.write().await;
        let Some(user) = state.users.remove(&user_id) else {
            return false;
        };
        state.emails.remove(&user.email);
        state.sessions.retain(|_, s| s.user_id != user_id);
        true
    }

    /// Stores a session.
    pub async fn insert_session(&self, session: &Session) {
        self.state
            .write()
            .await
            .sessions
            .insert(session.session_id, session.clone());
    }

    /// Looks a session up by id, expired or not.
    pub async fn find_session(&self, session_id: SessionId) -> Option<Session> {
        self.state.read().await.sessions.get(&session_id).cloned()
    }

    /// Deletes a session. Returns `true` if it existed.
    pub async fn delete_session(&self, session_id: SessionId) -> bool {
        self.state
            .write()
            .await
            .sessions
            .remove(&session_id)
            .is_some()
    }

    /// Deletes every session expired at `now`, returning how many.
    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> u64 {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired_at(now));
        u64::try_from(before.saturating_sub(state.sessions.len())).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str) -> UserRecord {
        UserRecord::new(email.to_string(), "hash".to_string())
    }

    #[tokio::test]
    async fn insert_and_find_user() {
        let store = MemoryStore::new();
        let alice = user("alice@example.com");
        assert!(store.insert_user(&alice).await.is_ok());

        assert_eq!(store.find_user_by_email("alice@example.com").await, Some(alice.clone()));
        assert_eq!(store.find_user_by_id(alice.id).await, Some(alice));
        assert!(store.find_user_by_email("bob@example.com").await.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        assert!(store.insert_user(&user("alice@example.com")).await.is_ok());
        let result = store.insert_user(&user("alice@example.com")).await;
        assert!(matches!(result, Err(GatewayError::UserExists)));
    }

    #[tokio::test]
    async fn delete_user_drops_its_sessions() {
        let store = MemoryStore::new();
        let alice = user("alice@example.com");
        let _ = store.insert_user(&alice).await;
        let session = Session::open(alice.id, Duration::hours(1));
        store.insert_session(&session).await;

        assert!(store.delete_user(alice.id).await);
        assert!(!store.delete_user(alice.id).await);
        assert!(store.find_session(session.session_id).await.is_none());
        assert!(store.find_user_by_email("alice@example.com").await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_purged() {
        let store = MemoryStore::new();
        let user_id = UserId::new();
        let live = Session::open(user_id, Duration::hours(1));
        let dead = Session::open(user_id, Duration::zero());
        store.insert_session(&live).await;
        store.insert_session(&dead).await;

        assert_eq!(store.delete_expired_sessions(Utc::now()).await, 1);
        assert!(store.find_session(live.session_id).await.is_some());
        assert!(store.find_session(dead.session_id).await.is_none());
    }
}
