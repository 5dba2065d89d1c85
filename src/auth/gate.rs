//! Admission control for real-time connections.
//!
//! [`AuthGate::admit`] runs on the upgrade request, before the socket is
//! upgraded. A connection therefore never exchanges a single frame until
//! its principal is bound, and a rejected attempt never reaches the
//! [`crate::domain::ConnectionRegistry`].

use axum::http::HeaderMap;
use chrono::Utc;

use super::cookie::find_cookie;
use super::{IdentityVerifier, SessionStore};
use crate::domain::{Principal, SessionId, UserId, UserRecord};
use crate::error::AdmissionError;

/// Result of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedConnection {
    /// Session the connection was admitted under.
    pub session_id: SessionId,
    /// Principal to bind to the connection.
    pub principal: Principal,
}

/// Cookie → session → user resolution shared by WebSocket admission and
/// the HTTP [`super::CurrentUser`] extractor.
#[derive(Debug, Clone)]
pub struct AuthGate {
    sessions: SessionStore,
    identities: IdentityVerifier,
    cookie_name: String,
}

impl AuthGate {
    /// Creates a gate reading the session id from cookie `cookie_name`.
    #[must_use]
    pub fn new(sessions: SessionStore, identities: IdentityVerifier, cookie_name: String) -> Self {
        Self {
            sessions,
            identities,
            cookie_name,
        }
    }

    /// Resolves the session cookie in `headers` to its session and user.
    ///
    /// # Errors
    ///
    /// Returns an [`AdmissionError`] when the cookie is absent or malformed,
    /// the session is unknown or expired, the user no longer exists, or a
    /// store lookup fails.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<(SessionId, UserRecord), AdmissionError> {
        let raw = find_cookie(headers, &self.cookie_name).ok_or(AdmissionError::MissingCookie)?;
        let session_id: SessionId = raw.parse().map_err(|_| AdmissionError::MalformedCookie)?;

        let session = self
            .sessions
            .lookup(session_id)
            .await?
            .ok_or(AdmissionError::UnknownSession)?;
        if session.is_expired_at(Utc::now()) {
            return Err(AdmissionError::SessionExpired);
        }

        let user = self
            .identities
            .resolve(session.user_id)
            .await?
            .ok_or(AdmissionError::PrincipalNotFound)?;

        Ok((session_id, user))
    }

    /// Admits or rejects a real-time connection attempt.
    ///
    /// Has no side effect: on success the caller registers the connection.
    ///
    /// # Errors
    ///
    /// See [`Self::authenticate`].
    pub async fn admit(&self, headers: &HeaderMap) -> Result<AdmittedConnection, AdmissionError> {
        let (session_id, user) = self.authenticate(headers).await?;
        Ok(AdmittedConnection {
            session_id,
            principal: Principal::from(&user),
        })
    }

    /// Re-checks an earlier admission once the connection is registered.
    ///
    /// Fails if the session was destroyed or expired, or the user deleted,
    /// since [`Self::admit`] ran.
    ///
    /// # Errors
    ///
    /// Returns the [`AdmissionError`] [`Self::admit`] would now return.
    pub async fn revalidate(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<(), AdmissionError> {
        let session = self
            .sessions
            .lookup(session_id)
            .await?
            .filter(|session| session.user_id == user_id)
            .ok_or(AdmissionError::UnknownSession)?;
        if session.is_expired_at(Utc::now()) {
            return Err(AdmissionError::SessionExpired);
        }
        self.identities
            .resolve(user_id)
            .await?
            .ok_or(AdmissionError::PrincipalNotFound)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::header::COOKIE;
    use chrono::Duration;

    use crate::domain::{Session, UserRecord};
    use crate::persistence::Persistence;

    struct Fixture {
        persistence: Persistence,
        gate: AuthGate,
        user: UserRecord,
    }

    async fn fixture() -> Fixture {
        let persistence = Persistence::in_memory();
        let user = UserRecord::new("alice@example.com".to_string(), "hash".to_string());
        let Ok(()) = persistence.insert_user(&user).await else {
            panic!("insert failed");
        };
        let gate = AuthGate::new(
            SessionStore::new(persistence.clone(), Duration::hours(1)),
            IdentityVerifier::new(persistence.clone()),
            "sid".to_string(),
        );
        Fixture {
            persistence,
            gate,
            user,
        }
    }

    fn cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let Ok(v) = HeaderValue::from_str(&format!("theme=dark; sid={value}")) else {
            panic!("invalid header value");
        };
        headers.insert(COOKIE, v);
        headers
    }

    async fn store_session(fx: &Fixture, ttl: Duration) -> Session {
        let session = Session::open(fx.user.id, ttl);
        let Ok(()) = fx.persistence.insert_session(&session).await else {
            panic!("insert failed");
        };
        session
    }

    #[tokio::test]
    async fn admits_valid_session() {
        let fx = fixture().await;
        let session = store_session(&fx, Duration::hours(1)).await;

        let Ok(admitted) = fx.gate.admit(&cookie(&session.session_id.to_string())).await else {
            panic!("valid session should be admitted");
        };
        assert_eq!(admitted.session_id, session.session_id);
        assert_eq!(admitted.principal.user_id, fx.user.id);
        assert_eq!(admitted.principal.label, "alice@example.com");
    }

    #[tokio::test]
    async fn rejects_missing_cookie() {
        let fx = fixture().await;
        let result = fx.gate.admit(&HeaderMap::new()).await;
        assert!(matches!(result, Err(AdmissionError::MissingCookie)));
    }

    #[tokio::test]
    async fn rejects_malformed_cookie() {
        let fx = fixture().await;
        let result = fx.gate.admit(&cookie("s%3Anot-a-uuid")).await;
        assert!(matches!(result, Err(AdmissionError::MalformedCookie)));
    }

    #[tokio::test]
    async fn rejects_unknown_session() {
        let fx = fixture().await;
        let result = fx.gate.admit(&cookie(&SessionId::new().to_string())).await;
        assert!(matches!(result, Err(AdmissionError::UnknownSession)));
    }

    #[tokio::test]
    async fn rejects_expired_session() {
        let fx = fixture().await;
        let session = store_session(&fx, Duration::zero()).await;
        let result = fx.gate.admit(&cookie(&session.session_id.to_string())).await;
        assert!(matches!(result, Err(AdmissionError::SessionExpired)));
    }

    #[tokio::test]
    async fn rejects_deleted_principal() {
        let fx = fixture().await;
        let session = Session::open(crate::domain::UserId::new(), Duration::hours(1));
        let Ok(()) = fx.persistence.insert_session(&session).await else {
            panic!("insert failed");
        };

        let result = fx.gate.admit(&cookie(&session.session_id.to_string())).await;
        assert!(matches!(result, Err(AdmissionError::PrincipalNotFound)));
    }

    #[tokio::test]
    async fn revalidate_accepts_unchanged_admission() {
        let fx = fixture().await;
        let session = store_session(&fx, Duration::hours(1)).await;
        let Ok(admitted) = fx.gate.admit(&cookie(&session.session_id.to_string())).await else {
            panic!("valid session should be admitted");
        };

        let result = fx
            .gate
            .revalidate(admitted.session_id, admitted.principal.user_id)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn revalidate_rejects_session_destroyed_after_admission() {
        let fx = fixture().await;
        let session = store_session(&fx, Duration::hours(1)).await;
        let Ok(admitted) = fx.gate.admit(&cookie(&session.session_id.to_string())).await else {
            panic!("valid session should be admitted");
        };
        let Ok(true) = fx.persistence.delete_session(session.session_id).await else {
            panic!("delete failed");
        };

        let result = fx
            .gate
            .revalidate(admitted.session_id, admitted.principal.user_id)
            .await;
        assert!(matches!(result, Err(AdmissionError::UnknownSession)));
    }

    #[tokio::test]
    async fn revalidate_rejects_user_deleted_after_admission() {
        let fx = fixture().await;
        let session = store_session(&fx, Duration::hours(1)).await;
        let Ok(admitted) = fx.gate.admit(&cookie(&session.session_id.to_string())).await else {
            panic!("valid session should be admitted");
        };
        let Ok(true) = fx.persistence.delete_user(fx.user.id).await else {
            panic!("delete failed");
        };

        let result = fx
            .gate
            .revalidate(admitted.session_id, admitted.principal.user_id)
            .await;
        assert!(matches!(
            result,
            Err(AdmissionError::UnknownSession | AdmissionError::PrincipalNotFound)
        ));
    }

    #[tokio::test]
    async fn revalidate_rejects_mismatched_user() {
        let fx = fixture().await;
        let session = store_session(&fx, Duration::hours(1)).await;

        let result = fx
            .gate
            .revalidate(session.session_id, crate::domain::UserId::new())
            .await;
        assert!(matches!(result, Err(AdmissionError::UnknownSession)));
    }
}
