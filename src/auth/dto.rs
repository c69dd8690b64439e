use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Remember-me opt-in; a persistent token is only issued when set.
    #[serde(default)]
    pub remember: bool,
}

/// Request body for the resend-activation and forgot-password flows.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Request body for completing a password reset.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// Request body for silent re-authentication.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    /// Remember-me token to fall back to when no valid bearer token is
    /// presented.
    pub remember_token: Option<String>,
}

/// Response returned after login or silent re-authentication.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_token: Option<String>,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Plain acknowledgement for flows that only send mail or clear state.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response for the reset-form preflight.
#[derive(Debug, Serialize)]
pub struct ResetPromptResponse {
    pub email: String,
}
