use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

/// Authentication failure taxonomy. Variants stay distinct internally for
/// logging; `public` collapses them for callers so token errors never reveal
/// whether a token was unknown, expired or already used, and password errors
/// never reveal whether the email exists.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user not found")]
    UserNotFound,
    #[error("account not verified")]
    AccountInactive,
    #[error("password mismatch")]
    PasswordMismatch,
    #[error("email already registered")]
    EmailAlreadyRegistered,
    #[error("token not found")]
    TokenNotFound,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token malformed")]
    TokenMalformed,
    #[error("token signature invalid")]
    SignatureInvalid,
    #[error("no token presented")]
    TokenMissing,
    /// Store/connectivity failure. Fatal for the request, never surfaced as
    /// an authentication failure.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    /// True for every failure of a presented token, regardless of kind.
    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            AuthError::TokenNotFound
                | AuthError::TokenExpired
                | AuthError::TokenInvalid
                | AuthError::TokenMalformed
                | AuthError::SignatureInvalid
                | AuthError::TokenMissing
        )
    }

    /// Collapse to the status and message shown to the caller.
    pub fn public(self) -> (StatusCode, String) {
        match self {
            AuthError::UserNotFound | AuthError::PasswordMismatch => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".into())
            }
            // Deliberately distinguishable so a verified-but-forgetful user
            // gets actionable guidance.
            AuthError::AccountInactive => (
                StatusCode::FORBIDDEN,
                "Please verify your account by e-mail first".into(),
            ),
            AuthError::EmailAlreadyRegistered => {
                (StatusCode::CONFLICT, "Email already registered".into())
            }
            e if e.is_token_failure() => {
                (StatusCode::UNAUTHORIZED, "Invalid or expired token".into())
            }
            AuthError::Store(e) => {
                error!(error = %e, "store failure during authentication");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
            // is_token_failure covers the rest; unreachable but total.
            _ => (StatusCode::UNAUTHORIZED, "Invalid or expired token".into()),
        }
    }
}
