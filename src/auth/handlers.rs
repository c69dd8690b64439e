use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        authenticator::normalize_email,
        dto::{
            AuthResponse, EmailRequest, LoginRequest, MessageResponse, PublicUser,
            RegisterRequest, ResetPasswordRequest, ResetPromptResponse, SessionRequest,
        },
        error::AuthError,
        extractors::{bearer_token, AuthUser},
        gateway::AuthStrategy,
    },
    state::AppState,
    store::TokenPurpose,
};

const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/session", post(session))
        .route("/auth/verify/:token", get(verify_email))
        .route("/auth/resend", post(resend_activation))
        .route("/auth/forgot", post(forgot_password))
        .route("/auth/reset/:token", get(reset_prompt).post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

/// Spawn a mail send without gating the calling request on its outcome.
fn send_mail_background(state: &AppState, to: String, subject: &'static str, html: String) {
    let mailer = state.mailer.clone();
    let from = state.config.mail.from.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&from, &to, subject, &html).await {
            error!(error = %e, %to, "failed to send mail");
        }
    });
}

fn validate_password(password: &str) -> Result<(), (StatusCode, String)> {
    if password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), (StatusCode, String)> {
    let email = normalize_email(&payload.email);

    if payload.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name is required".into()));
    }
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    validate_password(&payload.password)?;

    let (user, token) = state
        .authenticator()
        .register(&payload.name, &email, &payload.password)
        .await
        .map_err(AuthError::public)?;

    let link = format!(
        "{}/api/v1/auth/verify/{}",
        state.config.mail.public_base_url, token
    );
    let html = format!(
        "Hi there,<br/>Thank you for registering!<br/><br/>\
         Please verify your email by clicking the following link:<br/>\
         <a href=\"{link}\">{link}</a><br/><br/>Have a pleasant day!"
    );
    send_mail_background(&state, user.email.clone(), "Please verify your email!", html);

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "An activation e-mail has been sent to you. You must activate before you can log in".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let session = state
        .gateway()
        .authenticate(AuthStrategy::Password {
            email,
            password: payload.password,
            remember: payload.remember,
        })
        .await
        .map_err(AuthError::public)?;

    let token = state
        .session_validator()
        .keys()
        .sign(session.user_id)
        .map_err(AuthError::public)?;

    let user = state
        .store
        .find_by_id(session.user_id)
        .await
        .map_err(|e| AuthError::Store(e).public())?
        .ok_or_else(|| AuthError::UserNotFound.public())?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        token,
        remember_token: session.remember_token,
        user: PublicUser {
            id: user.id,
            name: user.name,
            email: user.email,
        },
    }))
}

/// Silent re-authentication: a valid bearer token or, failing that, a
/// remember-me token is exchanged for a fresh session.
#[instrument(skip(state, headers, payload))]
pub async fn session(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let bearer = bearer_token(&headers);

    let session = state
        .gateway()
        .authenticate_with_fallback(bearer, payload.remember_token)
        .await
        .map_err(AuthError::public)?;

    let token = state
        .session_validator()
        .keys()
        .sign(session.user_id)
        .map_err(AuthError::public)?;

    let user = state
        .store
        .find_by_id(session.user_id)
        .await
        .map_err(|e| AuthError::Store(e).public())?
        .ok_or_else(|| AuthError::UserNotFound.public())?;

    info!(user_id = %user.id, via = ?session.via, "session refreshed");
    Ok(Json(AuthResponse {
        token,
        remember_token: session.remember_token,
        user: PublicUser {
            id: user.id,
            name: user.name,
            email: user.email,
        },
    }))
}

#[instrument(skip(state, user))]
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    state
        .gateway()
        .logout(user.0)
        .await
        .map_err(AuthError::public)?;
    info!(user_id = %user.0, "user logged out");
    Ok(Json(MessageResponse {
        message: "You are logged out".into(),
    }))
}

#[instrument(skip(state, token))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let user_id = state
        .token_engine()
        .verify(&token, TokenPurpose::EmailVerification)
        .await
        .map_err(AuthError::public)?;

    info!(%user_id, "email verified");
    Ok(Json(MessageResponse {
        message: "E-mail confirmed. You can now log in".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn resend_activation(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let email = normalize_email(&payload.email);

    let user = state
        .store
        .find_by_email(&email)
        .await
        .map_err(|e| AuthError::Store(e).public())?
        .ok_or_else(|| AuthError::UserNotFound.public())?;

    if user.active {
        warn!(user_id = %user.id, "resend requested for active account");
        return Err((StatusCode::CONFLICT, "User already active".into()));
    }

    let token = state
        .token_engine()
        .issue(
            user.id,
            TokenPurpose::EmailVerification,
            state.verification_ttl(),
        )
        .await
        .map_err(AuthError::public)?;

    let link = format!(
        "{}/api/v1/auth/verify/{}",
        state.config.mail.public_base_url, token
    );
    let html = format!(
        "Hi there,<br/>We are resending your activation email.<br/><br/>\
         Please verify your email by clicking the following link:<br/>\
         <a href=\"{link}\">{link}</a><br/><br/>Have a pleasant day!"
    );
    send_mail_background(&state, user.email.clone(), "Activation email resend request", html);

    info!(user_id = %user.id, "activation email re-sent");
    Ok(Json(MessageResponse {
        message: format!("Another activation e-mail has been sent to {}", user.email),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let email = normalize_email(&payload.email);

    let user = state
        .store
        .find_by_email(&email)
        .await
        .map_err(|e| AuthError::Store(e).public())?
        .ok_or_else(|| AuthError::UserNotFound.public())?;

    let token = state
        .token_engine()
        .issue(user.id, TokenPurpose::PasswordReset, state.reset_ttl())
        .await
        .map_err(AuthError::public)?;

    let link = format!(
        "{}/api/v1/auth/reset/{}",
        state.config.mail.public_base_url, token
    );
    let html = format!(
        "Hi there,<br/>You are receiving this because you (or someone else) has requested \
         the reset of the password for your account.<br/><br/>\
         Please click the following link to complete the process<br/>\
         <a href=\"{link}\">{link}</a><br/><br/>\
         If you did not request this, please ignore this email and your password will remain unchanged."
    );
    send_mail_background(&state, user.email.clone(), "Password Reset Request", html);

    info!(user_id = %user.id, "password reset email sent");
    Ok(Json(MessageResponse {
        message: format!("A password reset e-mail has been sent to {}", user.email),
    }))
}

/// Non-consuming preflight so a reset form can be gated before the new
/// password is submitted.
#[instrument(skip(state, token))]
pub async fn reset_prompt(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ResetPromptResponse>, (StatusCode, String)> {
    let user = state
        .token_engine()
        .peek(&token, TokenPurpose::PasswordReset)
        .await
        .map_err(AuthError::public)?;

    Ok(Json(ResetPromptResponse { email: user.email }))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    validate_password(&payload.password)?;

    // Consumes the token; a retry with the same token gets the collapsed
    // "invalid or expired" rejection.
    let user_id = state
        .token_engine()
        .verify(&token, TokenPurpose::PasswordReset)
        .await
        .map_err(AuthError::public)?;

    state
        .authenticator()
        .reset_password(user_id, &payload.password)
        .await
        .map_err(AuthError::public)?;

    if let Ok(Some(user)) = state.store.find_by_id(user_id).await {
        let html = format!(
            "Hi there,<br/>This is a confirmation that the password for your account {} \
             has just been changed.<br/><br/>Have a pleasant day!",
            user.email
        );
        send_mail_background(&state, user.email, "Your password has been changed", html);
    }

    info!(%user_id, "password changed");
    Ok(Json(MessageResponse {
        message: "Success! Your password has been changed".into(),
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = state
        .store
        .find_by_id(user_id)
        .await
        .map_err(|e| AuthError::Store(e).public())?
        .ok_or_else(|| AuthError::UserNotFound.public())?;

    Ok(Json(PublicUser {
        id: user.id,
        name: user.name,
        email: user.email,
    }))
}
