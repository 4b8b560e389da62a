//! Database helpers for user administration.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::super::auth::is_unique_violation;

/// Public user fields; the password hash never leaves the database layer.
#[derive(Debug)]
pub(crate) struct UserSummary {
    pub(crate) id: Uuid,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) totp_enabled: bool,
    pub(crate) created_at: DateTime<Utc>,
}

/// Outcome when updating a user record.
#[derive(Debug)]
pub(super) enum UpdateOutcome {
    Updated(UserSummary),
    Missing,
    EmailConflict,
}

const USER_COLUMNS: &str = "id, username, email, totp_enabled, created_at";

fn user_from_row(row: &PgRow) -> UserSummary {
    UserSummary {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        totp_enabled: row.get("totp_enabled"),
        created_at: row.get("created_at"),
    }
}

pub(super) async fn list_users(pool: &PgPool) -> Result<Vec<UserSummary>> {
    let query = format!(
        r"
        SELECT {USER_COLUMNS}
        FROM users
        ORDER BY created_at ASC
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list users")?;
    Ok(rows.iter().map(user_from_row).collect())
}

pub(super) async fn fetch_user_summary(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserSummary>> {
    let query = format!(
        r"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE id = $1
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn update_user(
    pool: &PgPool,
    user_id: Uuid,
    username: Option<&str>,
    email: Option<&str>,
    password_hash: Option<&str>,
) -> Result<UpdateOutcome> {
    let query = format!(
        r"
        UPDATE users
        SET username = COALESCE($2, username),
            email = COALESCE($3, email),
            password_hash = COALESCE($4, password_hash),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match row {
        Ok(Some(row)) => Ok(UpdateOutcome::Updated(user_from_row(&row))),
        Ok(None) => Ok(UpdateOutcome::Missing),
        Err(err) if is_unique_violation(&err) => Ok(UpdateOutcome::EmailConflict),
        Err(err) => Err(err).context("failed to update user"),
    }
}

pub(super) async fn delete_user(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    // Sessions, tasks, and reminder subscriptions go with the user (cascade).
    let query = "DELETE FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user")?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::UpdateOutcome;

    #[test]
    fn update_outcome_debug_names() {
        assert_eq!(format!("{:?}", UpdateOutcome::Missing), "Missing");
        assert_eq!(
            format!("{:?}", UpdateOutcome::EmailConflict),
            "EmailConflict"
        );
    }
}
