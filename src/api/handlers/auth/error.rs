//! Error taxonomy for the auth flow, mapped to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// JSON body returned for every auth failure.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthError {
    DuplicateEmail,
    NotFound,
    InvalidCredentials,
    AlreadyEnabled,
    NoPendingSecret,
    NoPendingLogin,
    InvalidCode,
    StoreUnavailable,
}

impl AuthError {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::DuplicateEmail | Self::AlreadyEnabled => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidCredentials | Self::InvalidCode => StatusCode::UNAUTHORIZED,
            Self::NoPendingSecret | Self::NoPendingLogin => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::DuplicateEmail => "Email already registered",
            Self::NotFound => "User not found",
            Self::InvalidCredentials => "Invalid credentials",
            Self::AlreadyEnabled => "Two-factor authentication already enabled",
            Self::NoPendingSecret => "No pending two-factor setup",
            Self::NoPendingLogin => "No pending two-factor login",
            Self::InvalidCode => "Invalid code",
            Self::StoreUnavailable => "Service unavailable",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorBody {
                error: self.message().to_string(),
            }),
        )
            .into_response()
    }
}
