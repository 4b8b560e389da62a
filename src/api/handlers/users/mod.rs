//! User administration endpoints.

mod storage;

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::session::require_authenticated;
use super::auth::{normalize_email, valid_email};
use crate::password;
use storage::{
    delete_user, fetch_user_summary, list_users, update_user, UpdateOutcome, UserSummary,
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub totp_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserUpdateRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl From<UserSummary> for UserResponse {
    fn from(summary: UserSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            username: summary.username,
            email: summary.email,
            totp_enabled: summary.totp_enabled,
            created_at: summary.created_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "All users, without password hashes", body = [UserResponse]),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "users"
)]
pub async fn list(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    if let Err(status) = require_authenticated(&headers, &pool).await {
        return status.into_response();
    }

    match list_users(&pool).await {
        Ok(users) => {
            let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
            (StatusCode::OK, Json(users)).into_response()
        }
        Err(err) => {
            error!("Failed to list users: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such user"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "users"
)]
pub async fn get(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(status) = require_authenticated(&headers, &pool).await {
        return status.into_response();
    }

    match fetch_user_summary(&pool, user_id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such user"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "users"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(user_id): Path<Uuid>,
    payload: Option<Json<UserUpdateRequest>>,
) -> impl IntoResponse {
    let request: UserUpdateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // Emails are stored normalized; login looks them up the same way.
    let email_normalized = match request.email.as_deref() {
        Some(email) => {
            let normalized = normalize_email(email);
            if !valid_email(&normalized) {
                return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
            }
            Some(normalized)
        }
        None => None,
    };

    if let Err(status) = require_authenticated(&headers, &pool).await {
        return status.into_response();
    }

    // A supplied password is re-hashed; the stored hash is otherwise kept.
    let password_hash = match request.password.as_deref() {
        Some(new_password) => match password::hash(new_password) {
            Ok(hash) => Some(hash),
            Err(err) => {
                error!("Failed to hash password: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        },
        None => None,
    };

    match update_user(
        &pool,
        user_id,
        request.username.as_deref(),
        email_normalized.as_deref(),
        password_hash.as_deref(),
    )
    .await
    {
        Ok(UpdateOutcome::Updated(user)) => {
            (StatusCode::OK, Json(UserResponse::from(user))).into_response()
        }
        Ok(UpdateOutcome::Missing) => StatusCode::NOT_FOUND.into_response(),
        Ok(UpdateOutcome::EmailConflict) => {
            (StatusCode::CONFLICT, "Email already registered".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to update user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such user"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "users"
)]
pub async fn delete(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(status) = require_authenticated(&headers, &pool).await {
        return status.into_response();
    }

    match delete_user(&pool, user_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_response_from_summary() {
        let summary = UserSummary {
            id: Uuid::nil(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            totp_enabled: true,
            created_at: Utc::now(),
        };
        let response = UserResponse::from(summary);
        assert_eq!(response.id, Uuid::nil().to_string());
        assert!(response.totp_enabled);
    }

    #[test]
    fn update_request_fields_are_optional() {
        let request: UserUpdateRequest = serde_json::from_str("{}").unwrap();
        assert!(request.username.is_none());
        assert!(request.email.is_none());
        assert!(request.password.is_none());
    }

    #[tokio::test]
    async fn update_rejects_invalid_email_before_touching_store() {
        // Lazy pool: the handler must bail on validation without a query.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost:1/taskdeck")
            .unwrap();
        let request = UserUpdateRequest {
            username: None,
            email: Some("not-an-email".to_string()),
            password: None,
        };
        let response = update(
            HeaderMap::new(),
            Extension(pool),
            Path(Uuid::nil()),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
