//! Auth module tests against a disposable Postgres.

use super::rate_limit::NoopRateLimiter;
use super::session::require_authenticated;
use super::state::{AuthConfig, AuthState};
use super::storage::{
    enable_two_factor, fetch_user, insert_session, insert_user, lookup_login_user, lookup_session,
    stage_pending_secret, EnableOutcome, SessionState, SignupOutcome,
};
use super::two_factor::{two_factor_confirm, two_factor_verify};
use super::types::TwoFactorCodeRequest;
use super::utils::hash_session_token;
use crate::api::handlers::users;
use crate::test_support::TestDb;
use crate::totp::TotpEngine;
use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{Extension, Path},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

fn auth_state() -> Arc<AuthState> {
    Arc::new(AuthState::new(
        AuthConfig::new("http://localhost:8080".to_string()),
        Arc::new(NoopRateLimiter),
    ))
}

fn session_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value =
        HeaderValue::from_str(&format!("taskdeck_session={token}")).expect("valid cookie value");
    headers.insert(COOKIE, value);
    headers
}

async fn create_user(pool: &PgPool, username: &str, email: &str) -> Result<Uuid> {
    match insert_user(pool, username, email, "$argon2id$unused-in-this-test").await? {
        SignupOutcome::Created(id) => Ok(id),
        SignupOutcome::Conflict => Err(anyhow!("unexpected signup conflict")),
    }
}

fn build_totp(secret_base32: &str) -> Result<TOTP> {
    let secret = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|err| anyhow!("bad secret: {err:?}"))?;
    TOTP::new(Algorithm::SHA1, 6, 1, 30, secret, None, "user".to_string())
        .map_err(|err| anyhow!("totp init: {err}"))
}

fn current_code(secret_base32: &str) -> Result<String> {
    build_totp(secret_base32)?
        .generate_current()
        .context("generate current code")
}

/// A six digit code outside the accepted window (previous, current, next).
fn rejected_code(secret_base32: &str) -> Result<String> {
    let totp = build_totp(secret_base32)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time")?
        .as_secs();
    let valid = [now - 30, now, now + 30].map(|time| totp.generate(time));

    ["000000", "111111", "222222", "333333"]
        .into_iter()
        .find(|candidate| !valid.iter().any(|code| code == candidate))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("no rejected candidate found"))
}

#[tokio::test]
async fn register_concurrent_email_unique() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let task_one = insert_user(&db.pool, "alice", "alice@example.com", "hash-one");
    let task_two = insert_user(&db.pool, "alice-too", "alice@example.com", "hash-two");

    let (result_one, result_two) = tokio::join!(task_one, task_two);
    let outcomes = [result_one?, result_two?];
    let created = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, SignupOutcome::Created(_)))
        .count();
    let conflicts = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, SignupOutcome::Conflict))
        .count();

    assert_eq!(created, 1);
    assert_eq!(conflicts, 1);

    Ok(())
}

#[tokio::test]
async fn pending_session_is_not_authenticated() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let user_id = create_user(&db.pool, "bob", "bob@example.com").await?;
    let token = insert_session(&db.pool, user_id, SessionState::PendingTwoFactor, 300).await?;

    let record = lookup_session(&db.pool, &hash_session_token(&token))
        .await?
        .context("session row missing")?;
    assert_eq!(record.state, SessionState::PendingTwoFactor);

    let result = require_authenticated(&session_headers(&token), &db.pool).await;
    assert_eq!(result.err(), Some(StatusCode::UNAUTHORIZED));

    Ok(())
}

#[tokio::test]
async fn wrong_confirm_code_keeps_two_factor_disabled() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let state = auth_state();
    let user_id = create_user(&db.pool, "carol", "carol@example.com").await?;
    let token = insert_session(&db.pool, user_id, SessionState::Authenticated, 3600).await?;

    let enrollment = TotpEngine::new("Taskdeck").generate("carol@example.com")?;
    let record = lookup_session(&db.pool, &hash_session_token(&token))
        .await?
        .context("session row missing")?;
    assert!(stage_pending_secret(&db.pool, record.session_id, &enrollment.secret_base32).await?);

    let response = two_factor_confirm(
        session_headers(&token),
        Extension(db.pool.clone()),
        Extension(state),
        Some(Json(TwoFactorCodeRequest {
            code: rejected_code(&enrollment.secret_base32)?,
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let user = fetch_user(&db.pool, user_id)
        .await?
        .context("user row missing")?;
    assert!(!user.totp_enabled);
    assert!(user.totp_secret.is_none());

    Ok(())
}

#[tokio::test]
async fn enable_two_factor_is_one_shot() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let user_id = create_user(&db.pool, "dave", "dave@example.com").await?;

    let first = enable_two_factor(&db.pool, user_id, "FIRSTSECRETBASE32").await?;
    assert!(matches!(first, EnableOutcome::Enabled));

    let second = enable_two_factor(&db.pool, user_id, "SECONDSECRETBASE32").await?;
    assert!(matches!(second, EnableOutcome::AlreadyEnabled));

    // The losing secret never replaces the winning one.
    let user = fetch_user(&db.pool, user_id)
        .await?
        .context("user row missing")?;
    assert!(user.totp_enabled);
    assert_eq!(user.totp_secret.as_deref(), Some("FIRSTSECRETBASE32"));

    Ok(())
}

#[tokio::test]
async fn verify_promotes_session_and_refreshes_cookie() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let state = auth_state();
    let user_id = create_user(&db.pool, "erin", "erin@example.com").await?;
    let enrollment = TotpEngine::new("Taskdeck").generate("erin@example.com")?;
    let enabled = enable_two_factor(&db.pool, user_id, &enrollment.secret_base32).await?;
    assert!(matches!(enabled, EnableOutcome::Enabled));

    // The challenge session carries the short TTL the login handler uses.
    let token = insert_session(&db.pool, user_id, SessionState::PendingTwoFactor, 300).await?;

    let response = two_factor_verify(
        session_headers(&token),
        Extension(db.pool.clone()),
        Extension(state),
        Some(Json(TwoFactorCodeRequest {
            code: current_code(&enrollment.secret_base32)?,
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The cookie is re-issued at the full session lifetime, not the
    // five-minute challenge TTL the login response set.
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .context("missing Set-Cookie on promotion")?
        .to_str()?;
    assert!(cookie.starts_with(&format!("taskdeck_session={token};")));
    assert!(cookie.contains("Max-Age=43200"));

    let record = lookup_session(&db.pool, &hash_session_token(&token))
        .await?
        .context("session row missing")?;
    assert_eq!(record.state, SessionState::Authenticated);

    Ok(())
}

#[tokio::test]
async fn wrong_verify_code_leaves_session_pending() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let state = auth_state();
    let user_id = create_user(&db.pool, "frank", "frank@example.com").await?;
    let enrollment = TotpEngine::new("Taskdeck").generate("frank@example.com")?;
    enable_two_factor(&db.pool, user_id, &enrollment.secret_base32).await?;
    let token = insert_session(&db.pool, user_id, SessionState::PendingTwoFactor, 300).await?;

    let response = two_factor_verify(
        session_headers(&token),
        Extension(db.pool.clone()),
        Extension(state),
        Some(Json(TwoFactorCodeRequest {
            code: rejected_code(&enrollment.secret_base32)?,
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let record = lookup_session(&db.pool, &hash_session_token(&token))
        .await?
        .context("session row missing")?;
    assert_eq!(record.state, SessionState::PendingTwoFactor);

    Ok(())
}

#[tokio::test]
async fn updated_email_is_normalized_for_login() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };

    let user_id = create_user(&db.pool, "grace", "grace@example.com").await?;
    let token = insert_session(&db.pool, user_id, SessionState::Authenticated, 3600).await?;

    let response = users::update(
        session_headers(&token),
        Extension(db.pool.clone()),
        Path(user_id),
        Some(Json(users::UserUpdateRequest {
            username: None,
            email: Some(" Grace.New@Example.COM ".to_string()),
            password: None,
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    // Login resolves the same row through the normalized form.
    let login_user = lookup_login_user(&db.pool, "grace.new@example.com").await?;
    assert!(login_user.is_some());
    let case_variant = lookup_login_user(&db.pool, " Grace.New@Example.COM ").await?;
    assert!(case_variant.is_none());

    Ok(())
}
