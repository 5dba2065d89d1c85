//! Login sessions referenced by the session cookie.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::{SessionId, UserId};

/// A login session.
///
/// Created by a successful register or login, destroyed by logout or by
/// the expired-session reaper. Read-only to the chat relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Token carried in the session cookie.
    pub session_id: SessionId,
    /// Account the session authenticates.
    pub user_id: UserId,
    /// When the session was opened.
    pub created_at: DateTime<Utc>,
    /// Instant after which the session is no longer valid.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Opens a new session for `user_id` that lives for `ttl`.
    #[must_use]
    pub fn open(user_id: UserId, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::new(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns `true` if the session has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_valid() {
        let session = Session::open(UserId::new(), Duration::hours(1));
        assert!(!session.is_expired_at(Utc::now()));
        assert!(session.expires_at > session.created_at);
    }

    #[test]
    fn session_expires_after_ttl() {
        let session = Session::open(UserId::new(), Duration::seconds(30));
        assert!(session.is_expired_at(session.expires_at));
        assert!(session.is_expired_at(session.created_at + Duration::minutes(1)));
    }

    #[test]
    fn zero_ttl_is_immediately_expired() {
        let session = Session::open(UserId::new(), Duration::zero());
        assert!(session.is_expired_at(Utc::now()));
    }
}
