//! Password login endpoint.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::error::{AuthError, ErrorBody};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::session_cookie;
use super::state::AuthState;
use super::storage::{insert_session, lookup_login_user, SessionState};
use super::types::{LoginRequest, LoginResponse, LoginStatus};
use super::utils::{extract_client_ip, normalize_email, valid_email};
use crate::password;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, or a two-factor challenge was issued", body = LoginResponse),
        (status = 400, description = "Validation error", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 404, description = "No account for that email", body = ErrorBody),
        (status = 500, description = "Store unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email_normalized = normalize_email(&request.email);
    if !valid_email(&email_normalized) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&email_normalized, RateLimitAction::Login)
            == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let user = match lookup_login_user(&pool, &email_normalized).await {
        Ok(Some(user)) => user,
        Ok(None) => return AuthError::NotFound.into_response(),
        Err(err) => {
            error!("Login lookup failed: {err}");
            return AuthError::StoreUnavailable.into_response();
        }
    };

    if !password::verify(&request.password, &user.password_hash) {
        return AuthError::InvalidCredentials.into_response();
    }

    // Password accepted. Either a full session, or a short-lived challenge
    // session that only the verify endpoint can upgrade.
    let (state, ttl_seconds, status) = if user.totp_enabled {
        (
            SessionState::PendingTwoFactor,
            auth_state.config().challenge_ttl_seconds(),
            LoginStatus::TwoFactorRequired,
        )
    } else {
        (
            SessionState::Authenticated,
            auth_state.config().session_ttl_seconds(),
            LoginStatus::Ok,
        )
    };

    let token = match insert_session(&pool, user.user_id, state, ttl_seconds).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return AuthError::StoreUnavailable.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(auth_state.config(), &token, ttl_seconds) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return AuthError::StoreUnavailable.into_response();
        }
    }

    (
        StatusCode::OK,
        response_headers,
        Json(LoginResponse { status }),
    )
        .into_response()
}
