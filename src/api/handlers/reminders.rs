//! Reminder subscription endpoints.
//!
//! A subscription ties the authenticated user to a Telegram chat id. The
//! reminder worker delivers deadline notifications to every subscribed chat.

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::session::require_authenticated;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SubscriptionRequest {
    /// Telegram chat id the user obtained from the bot.
    pub chat_id: i64,
}

async fn upsert_subscription(pool: &PgPool, user_id: Uuid, chat_id: i64) -> Result<()> {
    let query = r"
        INSERT INTO reminder_subscribers (user_id, chat_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET chat_id = EXCLUDED.chat_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(chat_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert reminder subscription")?;
    Ok(())
}

async fn delete_subscription(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "DELETE FROM reminder_subscribers WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete reminder subscription")?;
    Ok(())
}

#[utoipa::path(
    put,
    path = "/v1/reminders/subscription",
    request_body = SubscriptionRequest,
    responses(
        (status = 204, description = "Subscription stored"),
        (status = 400, description = "Missing payload"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "reminders"
)]
pub async fn subscribe(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<SubscriptionRequest>>,
) -> impl IntoResponse {
    let request: SubscriptionRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let record = match require_authenticated(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    match upsert_subscription(&pool, record.user_id, request.chat_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to store reminder subscription: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/reminders/subscription",
    responses(
        (status = 204, description = "Subscription removed, if any"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "reminders"
)]
pub async fn unsubscribe(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let record = match require_authenticated(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    match delete_subscription(&pool, record.user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to remove reminder subscription: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
