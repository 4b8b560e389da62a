//! Database helpers for users and session state.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{generate_session_token, hash_session_token, is_unique_violation};

/// Outcome when attempting to create a new user record.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(Uuid),
    Conflict,
}

/// Outcome of the conditional two-factor enablement update.
#[derive(Debug)]
pub(super) enum EnableOutcome {
    Enabled,
    AlreadyEnabled,
}

/// Server-side session state. Anonymous clients have no session row at all.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SessionState {
    PendingTwoFactor,
    Authenticated,
}

impl SessionState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::PendingTwoFactor => "pending_2fa",
            Self::Authenticated => "authenticated",
        }
    }

    pub(crate) fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "pending_2fa" => Some(Self::PendingTwoFactor),
            "authenticated" => Some(Self::Authenticated),
            _ => None,
        }
    }
}

/// Minimal fields needed to check a password login.
pub(super) struct LoginUser {
    pub(super) user_id: Uuid,
    pub(super) password_hash: String,
    pub(super) totp_enabled: bool,
}

/// A user record as re-fetched per request; never includes the password hash.
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) totp_enabled: bool,
    pub(crate) totp_secret: Option<String>,
}

/// Data returned for a valid session cookie. The session stores only the
/// user id; attributes live in `users` and are fetched separately.
pub(crate) struct SessionRecord {
    pub(crate) session_id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) state: SessionState,
    pub(crate) pending_totp_secret: Option<String>,
    pub(crate) pending_totp_staged_at: Option<DateTime<Utc>>,
}

pub(super) async fn insert_user(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let query = r"
        INSERT INTO users (username, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(SignupOutcome::Created(row.get("id"))),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Look up credentials by normalized email.
pub(super) async fn lookup_login_user(pool: &PgPool, email: &str) -> Result<Option<LoginUser>> {
    let query = "SELECT id, password_hash, totp_enabled FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup login user")?;

    Ok(row.map(|row| LoginUser {
        user_id: row.get("id"),
        password_hash: row.get("password_hash"),
        totp_enabled: row.get("totp_enabled"),
    }))
}

pub(crate) async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = "SELECT id, username, email, totp_enabled, totp_secret FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        totp_enabled: row.get("totp_enabled"),
        totp_secret: row.get("totp_secret"),
    }))
}

pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    state: SessionState,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie.
    let query = r"
        INSERT INTO sessions (session_hash, user_id, state, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(user_id)
            .bind(state.as_str())
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(super) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    // Only unexpired sessions count; expired rows are left for TTL cleanup.
    let query = r"
        SELECT id, user_id, state, pending_totp_secret, pending_totp_staged_at
        FROM sessions
        WHERE session_hash = $1
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    let state: String = row.get("state");
    let state = SessionState::from_str(&state)
        .ok_or_else(|| anyhow!("unknown session state in database: {state}"))?;

    Ok(Some(SessionRecord {
        session_id: row.get("id"),
        user_id: row.get("user_id"),
        state,
        pending_totp_secret: row.get("pending_totp_secret"),
        pending_totp_staged_at: row.get("pending_totp_staged_at"),
    }))
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Stage a freshly generated setup secret on an authenticated session,
/// replacing any previous one so abandoned secrets are never reused.
pub(super) async fn stage_pending_secret(
    pool: &PgPool,
    session_id: Uuid,
    secret_base32: &str,
) -> Result<bool> {
    let query = r"
        UPDATE sessions
        SET pending_totp_secret = $2,
            pending_totp_staged_at = NOW()
        WHERE id = $1
          AND state = 'authenticated'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(session_id)
        .bind(secret_base32)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to stage pending secret")?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn clear_pending_secret(pool: &PgPool, session_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE sessions
        SET pending_totp_secret = NULL,
            pending_totp_staged_at = NULL
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to clear pending secret")?;
    Ok(())
}

/// Upgrade a pending-2FA session after a valid code, extending it to the
/// full session TTL. Returns false when the session was not pending.
pub(super) async fn promote_session(
    pool: &PgPool,
    session_id: Uuid,
    ttl_seconds: i64,
) -> Result<bool> {
    let query = r"
        UPDATE sessions
        SET state = 'authenticated',
            expires_at = NOW() + ($2 * INTERVAL '1 second')
        WHERE id = $1
          AND state = 'pending_2fa'
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(session_id)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to promote session")?;
    Ok(result.rows_affected() > 0)
}

/// Persist the confirmed secret and flip the flag in one conditional update.
/// The `totp_enabled = FALSE` guard makes concurrent confirmations race
/// safely: exactly one wins, the rest observe `AlreadyEnabled`.
pub(super) async fn enable_two_factor(
    pool: &PgPool,
    user_id: Uuid,
    secret_base32: &str,
) -> Result<EnableOutcome> {
    let query = r"
        UPDATE users
        SET totp_secret = $2,
            totp_enabled = TRUE,
            updated_at = NOW()
        WHERE id = $1
          AND totp_enabled = FALSE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(secret_base32)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to enable two-factor")?;

    if result.rows_affected() > 0 {
        Ok(EnableOutcome::Enabled)
    } else {
        Ok(EnableOutcome::AlreadyEnabled)
    }
}
