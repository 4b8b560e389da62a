//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login outcome: either a full session or a pending two-factor challenge.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    Ok,
    TwoFactorRequired,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub status: LoginStatus,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorSetupResponse {
    /// Base32 secret for manual entry into an authenticator app.
    pub secret_base32: String,
    pub otpauth_uri: String,
    /// QR code of the otpauth URI as a PNG data URL.
    pub qr_png_base64: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorCodeRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub totp_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_status_serializes_snake_case() -> Result<()> {
        let value = serde_json::to_value(LoginStatus::TwoFactorRequired)?;
        assert_eq!(value, serde_json::json!("two_factor_required"));
        let value = serde_json::to_value(LoginStatus::Ok)?;
        assert_eq!(value, serde_json::json!("ok"));
        Ok(())
    }

    #[test]
    fn register_request_round_trips() -> Result<()> {
        let request = RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "pw1".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "alice@example.com");
        let decoded: RegisterRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.username, "alice");
        Ok(())
    }

    #[test]
    fn session_response_shape() -> Result<()> {
        let response = SessionResponse {
            user_id: "00000000-0000-0000-0000-000000000000".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            totp_enabled: false,
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(
            value.get("totp_enabled"),
            Some(&serde_json::Value::Bool(false))
        );
        Ok(())
    }
}
