//! Two-factor setup, confirmation, and login verification.
//!
//! Setup stages a fresh secret on the caller's authenticated session; nothing
//! touches the user record until the first valid code confirms the secret.
//! Login verification checks codes against the persisted secret only.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::error::{AuthError, ErrorBody};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::{
    authenticate_session, extract_session_token, require_authenticated, session_cookie,
};
use super::state::AuthState;
use super::storage::{
    clear_pending_secret, enable_two_factor, fetch_user, promote_session, stage_pending_secret,
    EnableOutcome, SessionState,
};
use super::types::{TwoFactorCodeRequest, TwoFactorSetupResponse};
use super::utils::extract_client_ip;

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/setup",
    responses(
        (status = 200, description = "Fresh secret staged for confirmation", body = TwoFactorSetupResponse),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Two-factor already enabled", body = ErrorBody),
        (status = 500, description = "Store unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn two_factor_setup(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let record = match require_authenticated(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    let user = match fetch_user(&pool, record.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => {
            error!("Failed to fetch user for setup: {err}");
            return AuthError::StoreUnavailable.into_response();
        }
    };

    if user.totp_enabled {
        return AuthError::AlreadyEnabled.into_response();
    }

    let enrollment = match auth_state.totp().generate(&user.email) {
        Ok(enrollment) => enrollment,
        Err(err) => {
            error!("Failed to generate TOTP secret: {err}");
            return AuthError::StoreUnavailable.into_response();
        }
    };

    // Staging replaces any earlier unconfirmed secret; abandoned setup
    // attempts never leave a reusable secret behind.
    match stage_pending_secret(&pool, record.session_id, &enrollment.secret_base32).await {
        Ok(true) => {}
        Ok(false) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => {
            error!("Failed to stage pending secret: {err}");
            return AuthError::StoreUnavailable.into_response();
        }
    }

    let response = TwoFactorSetupResponse {
        secret_base32: enrollment.secret_base32,
        otpauth_uri: enrollment.otpauth_uri,
        qr_png_base64: enrollment.qr_png_base64,
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/confirm",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 204, description = "Two-factor enabled"),
        (status = 400, description = "No pending setup secret", body = ErrorBody),
        (status = 401, description = "Invalid code", body = ErrorBody),
        (status = 409, description = "Two-factor already enabled", body = ErrorBody),
        (status = 500, description = "Store unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn two_factor_confirm(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorCodeRequest>>,
) -> impl IntoResponse {
    let request: TwoFactorCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let record = match require_authenticated(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    let Some(staged_secret) = record.pending_totp_secret.clone() else {
        return AuthError::NoPendingSecret.into_response();
    };

    // Staged secrets are time-boxed; a stale one must be re-generated.
    let setup_ttl = Duration::seconds(auth_state.config().two_factor_setup_ttl_seconds());
    let stale = record
        .pending_totp_staged_at
        .is_none_or(|staged_at| Utc::now() - staged_at > setup_ttl);
    if stale {
        if let Err(err) = clear_pending_secret(&pool, record.session_id).await {
            error!("Failed to clear stale pending secret: {err}");
        }
        return AuthError::NoPendingSecret.into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::TwoFactorVerify)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    if !auth_state.totp().verify(&staged_secret, &request.code) {
        // Staged secret stays put so the user can retry with the next code.
        return AuthError::InvalidCode.into_response();
    }

    let outcome = match enable_two_factor(&pool, record.user_id, &staged_secret).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Failed to enable two-factor: {err}");
            return AuthError::StoreUnavailable.into_response();
        }
    };

    // Success or not, the staged secret is consumed.
    if let Err(err) = clear_pending_secret(&pool, record.session_id).await {
        error!("Failed to clear pending secret: {err}");
    }

    match outcome {
        EnableOutcome::Enabled => {
            info!(user_id = %record.user_id, "two-factor enabled");
            StatusCode::NO_CONTENT.into_response()
        }
        EnableOutcome::AlreadyEnabled => AuthError::AlreadyEnabled.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 204, description = "Session upgraded to authenticated"),
        (status = 400, description = "No pending two-factor login", body = ErrorBody),
        (status = 401, description = "Invalid code", body = ErrorBody),
        (status = 500, description = "Store unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn two_factor_verify(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorCodeRequest>>,
) -> impl IntoResponse {
    let request: TwoFactorCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let record = match authenticate_session(&headers, &pool).await {
        Ok(Some(record)) => record,
        Ok(None) => return AuthError::NoPendingLogin.into_response(),
        Err(status) => return status.into_response(),
    };

    if record.state != SessionState::PendingTwoFactor {
        return AuthError::NoPendingLogin.into_response();
    }

    // The persisted secret is authoritative for login verification; a
    // session-staged setup secret is never consulted here.
    let user = match fetch_user(&pool, record.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return AuthError::NoPendingLogin.into_response(),
        Err(err) => {
            error!("Failed to fetch user for verification: {err}");
            return AuthError::StoreUnavailable.into_response();
        }
    };

    let Some(secret) = user.totp_secret.filter(|_| user.totp_enabled) else {
        return AuthError::NoPendingLogin.into_response();
    };

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::TwoFactorVerify)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    if !auth_state.totp().verify(&secret, &request.code) {
        // Session stays pending; the user re-submits with the next code.
        return AuthError::InvalidCode.into_response();
    }

    let ttl_seconds = auth_state.config().session_ttl_seconds();
    match promote_session(&pool, record.session_id, ttl_seconds).await {
        Ok(true) => {
            // The login cookie only carried the short challenge TTL; re-issue
            // it at the full session lifetime so the browser keeps it as long
            // as the promoted session row lives.
            let mut response_headers = HeaderMap::new();
            if let Some(token) = extract_session_token(&headers) {
                match session_cookie(auth_state.config(), &token, ttl_seconds) {
                    Ok(cookie) => {
                        response_headers.insert(SET_COOKIE, cookie);
                    }
                    Err(err) => {
                        error!("Failed to build session cookie: {err}");
                        return AuthError::StoreUnavailable.into_response();
                    }
                }
            }
            (StatusCode::NO_CONTENT, response_headers).into_response()
        }
        Ok(false) => AuthError::NoPendingLogin.into_response(),
        Err(err) => {
            error!("Failed to promote session: {err}");
            AuthError::StoreUnavailable.into_response()
        }
    }
}
