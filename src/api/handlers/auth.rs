//! Account handlers: register, login, logout, dashboard, session, delete.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::api::dto::{
    AuthResponse, CredentialsRequest, DashboardResponse, MessageResponse, SessionDto,
    SessionInfoResponse, UserDto,
};
use crate::app_state::AppState;
use crate::auth::CurrentUser;
use crate::auth::cookie::find_cookie;
use crate::domain::{Session, SessionId};
use crate::error::{AdmissionError, ErrorResponse, GatewayError};

/// `POST /register` — Create an account and log it in.
///
/// # Errors
///
/// Returns [`GatewayError`] on invalid input, a taken email, or a store
/// failure.
#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    summary = "Register",
    description = "Creates an account, opens a session, and sets the session cookie.",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Registered and logged in", body = AuthResponse),
        (status = 400, description = "Invalid username or password", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let (user, session) = state
        .auth_service
        .register(&req.username, &req.password)
        .await?;

    Ok((
        [(SET_COOKIE, session_cookie(&state, &session))],
        Json(AuthResponse {
            message: "Registration successful".to_string(),
            user: user.email,
        }),
    ))
}

/// `POST /login` — Verify credentials and open a session.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidCredentials`] on mismatch, or a store
/// failure.
#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    summary = "Log in",
    description = "Verifies the password, opens a session, and sets the session cookie.",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let (user, session) = state
        .auth_service
        .login(&req.username, &req.password)
        .await?;

    Ok((
        [(SET_COOKIE, session_cookie(&state, &session))],
        Json(AuthResponse {
            message: "Login successful".to_string(),
            user: user.email,
        }),
    ))
}

/// `GET /logout` — Destroy the caller's session, if any, close the chat
/// connections opened under it, and expire the cookie.
///
/// # Errors
///
/// Returns [`GatewayError`] on a store failure.
#[utoipa::path(
    get,
    path = "/logout",
    tag = "Auth",
    summary = "Log out",
    description = "Destroys the current session and disconnects its chat connections. Succeeds for anonymous callers too.",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GatewayError> {
    let session_id = find_cookie(&headers, &state.cookies.name)
        .and_then(|raw| raw.parse::<SessionId>().ok());
    if let Some(session_id) = session_id {
        let closed = state.auth_service.logout(session_id).await?;
        tracing::info!(%session_id, connections = closed, "session destroyed");
    }

    Ok((
        [(SET_COOKIE, state.cookies.clear())],
        Json(MessageResponse::new("Logout successful")),
    ))
}

/// `GET /dashboard` — The authenticated caller's email.
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "Auth",
    summary = "Dashboard",
    responses(
        (status = 200, description = "Authenticated", body = DashboardResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
    )
)]
pub async fn dashboard(current: CurrentUser) -> impl IntoResponse {
    Json(DashboardResponse {
        email: current.user.email,
    })
}

/// `GET /session` — Debug view of the caller's session and account.
///
/// # Errors
///
/// Returns [`GatewayError`] if the session or user store fails.
#[utoipa::path(
    get,
    path = "/session",
    tag = "Auth",
    summary = "Current session",
    description = "Returns the caller's session and account, or nulls for anonymous callers.",
    responses(
        (status = 200, description = "Session view", body = SessionInfoResponse),
        (status = 500, description = "Session store unavailable", body = ErrorResponse),
    )
)]
pub async fn session_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GatewayError> {
    let (session_id, user) = match state.auth_gate.authenticate(&headers).await {
        Ok(found) => found,
        Err(AdmissionError::Lookup(e)) => return Err(e),
        Err(_) => {
            return Ok(Json(SessionInfoResponse {
                session: None,
                user: None,
            }));
        }
    };

    let session = state.auth_service.sessions().lookup(session_id).await?;
    Ok(Json(SessionInfoResponse {
        session: session.as_ref().map(SessionDto::from),
        user: Some(UserDto::from(&user)),
    }))
}

/// `DELETE /account` — Delete the caller's account and close its chat
/// connections.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] without a valid session, or a
/// store failure.
#[utoipa::path(
    delete,
    path = "/account",
    tag = "Auth",
    summary = "Delete account",
    description = "Deletes the account with its sessions and disconnects its live chat connections.",
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 401, description = "No valid session", body = ErrorResponse),
    )
)]
pub async fn delete_account(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, GatewayError> {
    state.auth_service.delete_account(&current.user).await?;

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, state.cookies.clear())],
        Json(MessageResponse::new("Account deleted")),
    ))
}

fn session_cookie(state: &AppState, session: &Session) -> String {
    state.cookies.issue(
        &session.session_id.to_string(),
        state.auth_service.sessions().ttl().num_seconds(),
    )
}

/// Account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard))
        .route("/session", get(session_info))
        .route("/account", delete(delete_account))
}
