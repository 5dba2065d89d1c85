//! `CurrentUser` extractor for session-protected HTTP handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::app_state::AppState;
use crate::domain::{SessionId, UserRecord};
use crate::error::GatewayError;

/// The authenticated caller of an HTTP request.
///
/// Rejects with [`GatewayError::Unauthorized`] when the session cookie does
/// not resolve to a live session and user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// Session the request was made under.
    pub session_id: SessionId,
    /// The caller's account.
    pub user: UserRecord,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (session_id, user) = state.auth_gate.authenticate(&parts.headers).await.map_err(|e| {
            tracing::debug!(error = %e, "request not authenticated");
            GatewayError::from(e)
        })?;
        Ok(Self { session_id, user })
    }
}
