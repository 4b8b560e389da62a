//! Owner-scoped task CRUD endpoints.

mod storage;

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::session::require_authenticated;
use storage::{delete_task, fetch_task, insert_task, list_tasks, update_task, TaskRecord};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TaskCreateRequest {
    pub title: String,
    pub description: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Partial update. For `description` and `deadline` an absent field keeps the
/// stored value while an explicit JSON `null` clears it.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TaskUpdateRequest {
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub completed: Option<bool>,
}

// Present-but-null deserializes to Some(None), absent stays None.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TaskResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TaskRecord> for TaskResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.title,
            description: record.description,
            deadline: record.deadline,
            completed: record.completed,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/tasks",
    responses(
        (status = 200, description = "Tasks for the authenticated user", body = [TaskResponse]),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "tasks"
)]
pub async fn list(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let record = match require_authenticated(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    match list_tasks(&pool, record.user_id).await {
        Ok(tasks) => {
            let tasks: Vec<TaskResponse> = tasks.into_iter().map(TaskResponse::from).collect();
            (StatusCode::OK, Json(tasks)).into_response()
        }
        Err(err) => {
            error!("Failed to list tasks: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/tasks",
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = TaskResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "tasks"
)]
pub async fn create(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<TaskCreateRequest>>,
) -> impl IntoResponse {
    let request: TaskCreateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let title = request.title.trim().to_string();
    if title.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing title".to_string()).into_response();
    }

    let record = match require_authenticated(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    match insert_task(
        &pool,
        record.user_id,
        &title,
        request.description.as_deref(),
        request.deadline,
    )
    .await
    {
        Ok(task) => (StatusCode::CREATED, Json(TaskResponse::from(task))).into_response(),
        Err(err) => {
            error!("Failed to create task: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/tasks/{id}",
    params(
        ("id" = String, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Task found", body = TaskResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such task for this user"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "tasks"
)]
pub async fn get(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(task_id): Path<Uuid>,
) -> impl IntoResponse {
    let record = match require_authenticated(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    match fetch_task(&pool, record.user_id, task_id).await {
        Ok(Some(task)) => (StatusCode::OK, Json(TaskResponse::from(task))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch task: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/v1/tasks/{id}",
    params(
        ("id" = String, Path, description = "Task id")
    ),
    request_body = TaskUpdateRequest,
    responses(
        (status = 200, description = "Task updated", body = TaskResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such task for this user"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "tasks"
)]
pub async fn update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(task_id): Path<Uuid>,
    payload: Option<Json<TaskUpdateRequest>>,
) -> impl IntoResponse {
    let request: TaskUpdateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let record = match require_authenticated(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    match update_task(
        &pool,
        record.user_id,
        task_id,
        request.title.as_deref(),
        request.description.as_ref().map(|inner| inner.as_deref()),
        request.deadline,
        request.completed,
    )
    .await
    {
        Ok(Some(task)) => (StatusCode::OK, Json(TaskResponse::from(task))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update task: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/tasks/{id}",
    params(
        ("id" = String, Path, description = "Task id")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No such task for this user"),
        (status = 500, description = "Store unavailable")
    ),
    tag = "tasks"
)]
pub async fn delete(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    Path(task_id): Path<Uuid>,
) -> impl IntoResponse {
    let record = match require_authenticated(&headers, &pool).await {
        Ok(record) => record,
        Err(status) => return status.into_response(),
    };

    match delete_task(&pool, record.user_id, task_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete task: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
