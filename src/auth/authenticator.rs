use std::sync::Arc;

use time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::tokens::TokenLifecycleEngine;
use crate::store::{CredentialStore, TokenPurpose};

/// Stable identity handed to downstream handlers on success. Never carries
/// the password hash.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Email + password verification against the stored Argon2 hash and the
/// account's activation state.
#[derive(Clone)]
pub struct PasswordAuthenticator {
    store: Arc<dyn CredentialStore>,
    tokens: TokenLifecycleEngine,
    verification_ttl: Duration,
}

impl PasswordAuthenticator {
    pub fn new(store: Arc<dyn CredentialStore>, verification_ttl: Duration) -> Self {
        let tokens = TokenLifecycleEngine::new(store.clone());
        Self {
            store,
            tokens,
            verification_ttl,
        }
    }

    /// Sequencing contract: the password is checked before the activation
    /// state, so a wrong password never reveals whether the account has been
    /// verified.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, AuthError> {
        let email = normalize_email(email);
        let user = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let ok =
            verify_password_blocking(password.to_owned(), user.password_hash.clone()).await?;
        if !ok {
            return Err(AuthError::PasswordMismatch);
        }

        if !user.active {
            return Err(AuthError::AccountInactive);
        }

        debug!(user_id = %user.id, "password authentication succeeded");
        Ok(AuthenticatedUser {
            id: user.id,
            name: user.name,
            email: user.email,
        })
    }

    /// Create an inactive account and issue its email-verification token.
    /// Returns the token so the caller can deliver it by mail; mail delivery
    /// never gates account creation.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(AuthenticatedUser, String), AuthError> {
        let email = normalize_email(email);
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let hash = hash_password_blocking(password.to_owned()).await?;
        let user = self.store.create(name, &email, &hash).await?;
        let token = self
            .tokens
            .issue(user.id, TokenPurpose::EmailVerification, self.verification_ttl)
            .await?;

        debug!(user_id = %user.id, %email, "user registered");
        Ok((
            AuthenticatedUser {
                id: user.id,
                name: user.name,
                email: user.email,
            },
            token,
        ))
    }

    /// Rehash and replace the password. The store clears any outstanding
    /// reset token in the same write, so a consumed reset token cannot be
    /// replayed against the new credential.
    pub async fn reset_password(&self, user_id: Uuid, new_password: &str) -> Result<(), AuthError> {
        let hash = hash_password_blocking(new_password.to_owned()).await?;
        self.store.update_password(user_id, &hash).await?;
        debug!(%user_id, "password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::TokenLifecycleEngine;
    use crate::state::AppState;

    fn authenticator(state: &AppState) -> PasswordAuthenticator {
        state.authenticator()
    }

    #[tokio::test]
    async fn register_creates_inactive_user_with_verification_token() {
        let state = AppState::fake();
        let auth = authenticator(&state);

        let (user, token) = auth
            .register("Bob", "Bob@Example.com ", "secret1")
            .await
            .expect("register");
        assert_eq!(user.email, "bob@example.com");
        assert!(!token.is_empty());

        let stored = state
            .store
            .find_by_email("bob@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.active);
        assert_eq!(stored.verify_token.as_deref(), Some(token.as_str()));
        assert_ne!(stored.password_hash, "secret1");
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let state = AppState::fake();
        let auth = authenticator(&state);
        auth.register("Bob", "bob@example.com", "secret1")
            .await
            .expect("first register");
        assert!(matches!(
            auth.register("Bobby", "bob@example.com", "other").await,
            Err(AuthError::EmailAlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn inactive_account_fails_with_correct_password() {
        let state = AppState::fake();
        let auth = authenticator(&state);
        auth.register("Bob", "bob@example.com", "secret1")
            .await
            .expect("register");

        assert!(matches!(
            auth.authenticate("bob@example.com", "secret1").await,
            Err(AuthError::AccountInactive)
        ));
    }

    #[tokio::test]
    async fn wrong_password_does_not_reveal_activation_state() {
        let state = AppState::fake();
        let auth = authenticator(&state);
        auth.register("Bob", "bob@example.com", "secret1")
            .await
            .expect("register");

        // Account is inactive, but the password check comes first.
        assert!(matches!(
            auth.authenticate("bob@example.com", "wrong").await,
            Err(AuthError::PasswordMismatch)
        ));
    }

    #[tokio::test]
    async fn unknown_email_fails_user_not_found() {
        let state = AppState::fake();
        let auth = authenticator(&state);
        assert!(matches!(
            auth.authenticate("nobody@example.com", "whatever").await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn register_verify_login_scenario() {
        let state = AppState::fake();
        let auth = authenticator(&state);
        let engine = TokenLifecycleEngine::new(state.store.clone());

        let (user, token) = auth
            .register("Bob", "bob@example.com", "secret1")
            .await
            .expect("register");

        let verified = engine
            .verify(&token, TokenPurpose::EmailVerification)
            .await
            .expect("verify within ttl");
        assert_eq!(verified, user.id);

        let authed = auth
            .authenticate("bob@example.com", "secret1")
            .await
            .expect("login after activation");
        assert_eq!(authed.id, user.id);

        // Email lookup is case-normalized.
        auth.authenticate(" BOB@example.com", "secret1")
            .await
            .expect("normalized login");
    }

    #[tokio::test]
    async fn reset_password_scenario() {
        let state = AppState::fake();
        let auth = authenticator(&state);
        let engine = TokenLifecycleEngine::new(state.store.clone());

        let (user, verify_token) = auth
            .register("Bob", "bob@example.com", "secret1")
            .await
            .expect("register");
        engine
            .verify(&verify_token, TokenPurpose::EmailVerification)
            .await
            .expect("activate");

        let reset_token = engine
            .issue(user.id, TokenPurpose::PasswordReset, Duration::seconds(60))
            .await
            .expect("issue reset");
        let owner = engine
            .verify(&reset_token, TokenPurpose::PasswordReset)
            .await
            .expect("consume reset");
        auth.reset_password(owner, "newpass1").await.expect("reset");

        assert!(matches!(
            auth.authenticate("bob@example.com", "secret1").await,
            Err(AuthError::PasswordMismatch)
        ));
        auth.authenticate("bob@example.com", "newpass1")
            .await
            .expect("new password works");

        // The consumed reset token cannot be replayed.
        assert!(matches!(
            engine.verify(&reset_token, TokenPurpose::PasswordReset).await,
            Err(AuthError::TokenNotFound)
        ));
    }
}
