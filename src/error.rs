//! Gateway error types.
//!
//! [`GatewayError`] is the central error type for the HTTP surface and the
//! stores. Each variant maps to an HTTP status code and a structured JSON
//! error response.
//!
//! The real-time relay has its own taxonomy, none of it fatal:
//!
//! - [`AdmissionError`] rejects a WebSocket before it is registered and
//!   maps to a close code.
//! - [`MessageError`] drops one inbound frame; the connection stays open.
//! - [`DeliveryError`] skips one recipient of a fan-out.

use axum::extract::ws::close_code;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ConnectionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "unauthorized",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category       | HTTP Status                  |
/// |-----------|----------------|------------------------------|
/// | 1000–1999 | Validation     | 400 Bad Request              |
/// | 2000–2999 | Authentication | 401 Unauthorized / 409       |
/// | 3000–3999 | Server         | 500 Internal Server Error    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No valid session accompanies the request.
    #[error("unauthorized")]
    Unauthorized,

    /// Email/password pair did not match an account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("user already exists")]
    UserExists,

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Unauthorized => 2001,
            Self::InvalidCredentials => 2002,
            Self::UserExists => 2003,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::UserExists => StatusCode::CONFLICT,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

/// Why a real-time connection attempt was refused.
///
/// Raised before the connection enters the registry; the client has to
/// re-authenticate over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The request carried no session cookie.
    #[error("missing session cookie")]
    MissingCookie,

    /// The session cookie is not a well-formed session token.
    #[error("malformed session cookie")]
    MalformedCookie,

    /// No session exists for the cookie.
    #[error("unknown session")]
    UnknownSession,

    /// The session exists but has expired.
    #[error("session expired")]
    SessionExpired,

    /// The session's user no longer exists.
    #[error("principal no longer exists")]
    PrincipalNotFound,

    /// The session or user store could not be queried.
    #[error("admission lookup failed: {0}")]
    Lookup(#[from] GatewayError),
}

impl AdmissionError {
    /// Returns the WebSocket close code sent to the rejected client.
    ///
    /// Every authorization failure is a policy violation (1008); a store
    /// failure is an internal error (1011).
    #[must_use]
    pub const fn close_code(&self) -> u16 {
        match self {
            Self::Lookup(_) => close_code::ERROR,
            _ => close_code::POLICY,
        }
    }

    /// Returns the close reason sent to the rejected client.
    ///
    /// Store failures are reported generically.
    #[must_use]
    pub const fn close_reason(&self) -> &'static str {
        match self {
            Self::Lookup(_) => "internal error",
            _ => "unauthorized",
        }
    }
}

impl From<AdmissionError> for GatewayError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Lookup(inner) => inner,
            _ => Self::Unauthorized,
        }
    }
}

/// Why an inbound chat frame was dropped.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload is not JSON or lacks a `type` field.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A `chat` frame without a string `message`.
    #[error("chat frame has no message text")]
    MissingText,

    /// A `chat` frame whose text is blank.
    #[error("chat message is empty")]
    EmptyText,

    /// A `chat` frame whose text exceeds the configured limit.
    #[error("chat message too long: {len} chars (max {max})")]
    TooLong {
        /// Length of the rejected text, in chars.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
}

/// Why a frame could not be queued for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The recipient's connection task has ended.
    #[error("connection {0} is gone")]
    RecipientGone(ConnectionId),

    /// The recipient's outbound queue is full.
    #[error("connection {0} outbound queue is full")]
    Backpressure(ConnectionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_unauthorized() {
        assert_eq!(
            GatewayError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(GatewayError::UserExists.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn error_codes_are_in_range() {
        assert_eq!(GatewayError::InvalidRequest(String::new()).error_code(), 1001);
        assert_eq!(GatewayError::Unauthorized.error_code(), 2001);
        assert_eq!(GatewayError::Internal(String::new()).error_code(), 3000);
    }

    #[test]
    fn admission_rejections_are_policy_violations() {
        for err in [
            AdmissionError::MissingCookie,
            AdmissionError::MalformedCookie,
            AdmissionError::UnknownSession,
            AdmissionError::SessionExpired,
            AdmissionError::PrincipalNotFound,
        ] {
            assert_eq!(err.close_code(), 1008);
            assert_eq!(err.close_reason(), "unauthorized");
        }
    }

    #[test]
    fn admission_lookup_failure_is_internal() {
        let err = AdmissionError::from(GatewayError::PersistenceError("down".to_string()));
        assert_eq!(err.close_code(), 1011);
        assert!(matches!(
            GatewayError::from(err),
            GatewayError::PersistenceError(_)
        ));
    }

    #[test]
    fn admission_error_converts_to_unauthorized() {
        assert!(matches!(
            GatewayError::from(AdmissionError::SessionExpired),
            GatewayError::Unauthorized
        ));
    }

    #[test]
    fn error_response_has_structured_body() {
        let response = GatewayError::UserExists.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
