//! Database helpers for owner-scoped task CRUD.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

pub(crate) struct TaskRecord {
    pub(crate) id: Uuid,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) deadline: Option<DateTime<Utc>>,
    pub(crate) completed: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

const TASK_COLUMNS: &str = "id, title, description, deadline, completed, created_at, updated_at";

fn task_from_row(row: &PgRow) -> TaskRecord {
    TaskRecord {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        deadline: row.get("deadline"),
        completed: row.get("completed"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) async fn insert_task(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    description: Option<&str>,
    deadline: Option<DateTime<Utc>>,
) -> Result<TaskRecord> {
    let query = format!(
        r"
        INSERT INTO tasks (user_id, title, description, deadline)
        VALUES ($1, $2, $3, $4)
        RETURNING {TASK_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(title)
        .bind(description)
        .bind(deadline)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert task")?;
    Ok(task_from_row(&row))
}

pub(super) async fn list_tasks(pool: &PgPool, user_id: Uuid) -> Result<Vec<TaskRecord>> {
    let query = format!(
        r"
        SELECT {TASK_COLUMNS}
        FROM tasks
        WHERE user_id = $1
        ORDER BY deadline ASC NULLS LAST, created_at ASC
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list tasks")?;
    Ok(rows.iter().map(task_from_row).collect())
}

pub(super) async fn fetch_task(
    pool: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
) -> Result<Option<TaskRecord>> {
    let query = format!(
        r"
        SELECT {TASK_COLUMNS}
        FROM tasks
        WHERE id = $1 AND user_id = $2
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch task")?;
    Ok(row.as_ref().map(task_from_row))
}

/// Partial update. The outer `Option` on `description` and `deadline` marks
/// whether the field was supplied at all; the inner one carries the new value
/// or an explicit clear.
#[allow(clippy::too_many_arguments)]
pub(super) async fn update_task(
    pool: &PgPool,
    user_id: Uuid,
    task_id: Uuid,
    title: Option<&str>,
    description: Option<Option<&str>>,
    deadline: Option<Option<DateTime<Utc>>>,
    completed: Option<bool>,
) -> Result<Option<TaskRecord>> {
    // A supplied deadline (set or cleared) re-arms the reminder for the task.
    let query = format!(
        r"
        UPDATE tasks
        SET title = COALESCE($3, title),
            description = CASE WHEN $4 THEN $5 ELSE description END,
            deadline = CASE WHEN $6 THEN $7 ELSE deadline END,
            completed = COALESCE($8, completed),
            reminded_at = CASE WHEN $6 THEN NULL ELSE reminded_at END,
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING {TASK_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(task_id)
        .bind(user_id)
        .bind(title)
        .bind(description.is_some())
        .bind(description.flatten())
        .bind(deadline.is_some())
        .bind(deadline.flatten())
        .bind(completed)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update task")?;
    Ok(row.as_ref().map(task_from_row))
}

pub(super) async fn delete_task(pool: &PgPool, user_id: Uuid, task_id: Uuid) -> Result<bool> {
    let query = "DELETE FROM tasks WHERE id = $1 AND user_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(task_id)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete task")?;
    Ok(result.rows_affected() > 0)
}
