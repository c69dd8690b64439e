use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::authenticator::PasswordAuthenticator;
use crate::auth::error::AuthError;
use crate::auth::remember::RememberMeRotator;
use crate::auth::session::BearerSessionValidator;

/// Per-route authentication strategy. Routes pick a variant explicitly;
/// there is no global strategy registry.
#[derive(Debug)]
pub enum AuthStrategy {
    Password {
        email: String,
        password: String,
        remember: bool,
    },
    Bearer {
        token: Option<String>,
    },
    RememberMe {
        token: String,
    },
}

impl AuthStrategy {
    fn kind(&self) -> StrategyKind {
        match self {
            AuthStrategy::Password { .. } => StrategyKind::Password,
            AuthStrategy::Bearer { .. } => StrategyKind::Bearer,
            AuthStrategy::RememberMe { .. } => StrategyKind::RememberMe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Password,
    Bearer,
    RememberMe,
}

/// Result of a successful authentication, exposed to downstream handlers.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub via: StrategyKind,
    /// Present when a remember-me credential was issued (password login with
    /// opt-in) or rotated (remember-me consumption); must be re-delivered to
    /// the client.
    pub remember_token: Option<String>,
}

/// Orchestrates the authentication strategies for one request and returns a
/// uniform result: an `AuthSession` or a typed rejection. Failures are
/// surfaced, never silently fallen past.
#[derive(Clone)]
pub struct AuthenticationGateway {
    authenticator: PasswordAuthenticator,
    validator: BearerSessionValidator,
    rotator: RememberMeRotator,
}

impl AuthenticationGateway {
    pub fn new(
        authenticator: PasswordAuthenticator,
        validator: BearerSessionValidator,
        rotator: RememberMeRotator,
    ) -> Self {
        Self {
            authenticator,
            validator,
            rotator,
        }
    }

    pub async fn authenticate(&self, strategy: AuthStrategy) -> Result<AuthSession, AuthError> {
        let kind = strategy.kind();
        debug!(?kind, "authenticating");
        let session = match strategy {
            AuthStrategy::Password {
                email,
                password,
                remember,
            } => {
                let user = self.authenticator.authenticate(&email, &password).await?;
                let remember_token = if remember {
                    Some(self.rotator.issue(user.id).await?)
                } else {
                    None
                };
                AuthSession {
                    user_id: user.id,
                    via: kind,
                    remember_token,
                }
            }
            AuthStrategy::Bearer { token } => {
                let user_id = self.validator.validate(token.as_deref()).await?;
                AuthSession {
                    user_id,
                    via: kind,
                    remember_token: None,
                }
            }
            AuthStrategy::RememberMe { token } => {
                let (user_id, next) = self.rotator.consume(&token).await?;
                AuthSession {
                    user_id,
                    via: kind,
                    remember_token: Some(next),
                }
            }
        };
        debug!(user_id = %session.user_id, via = ?session.via, "authenticated");
        Ok(session)
    }

    /// Protected-route policy: bearer first, remember-me as silent re-auth
    /// when no valid bearer token is present. Store failures propagate
    /// instead of triggering the fallback.
    pub async fn authenticate_with_fallback(
        &self,
        bearer: Option<String>,
        remember: Option<String>,
    ) -> Result<AuthSession, AuthError> {
        match self.authenticate(AuthStrategy::Bearer { token: bearer }).await {
            Ok(session) => Ok(session),
            Err(AuthError::Store(e)) => Err(AuthError::Store(e)),
            Err(bearer_err) => match remember {
                Some(token) => {
                    warn!(error = %bearer_err, "bearer rejected, trying remember-me re-auth");
                    self.authenticate(AuthStrategy::RememberMe { token }).await
                }
                None => Err(bearer_err),
            },
        }
    }

    /// Server-side part of logout: invalidate any outstanding remember-me
    /// token for the user.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.rotator.clear(user_id).await
    }
}
