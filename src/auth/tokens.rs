use std::sync::Arc;

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::store::{CredentialStore, TokenPurpose, User};

const TOKEN_LEN: usize = 32;

/// Random alphanumeric token from the OS RNG.
pub(crate) fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Issue/verify engine for single-use, time-bound tokens, shared by the
/// email-verification and password-reset flows.
///
/// Expiry is lazy: nothing sweeps expired tokens in the background, they are
/// cleared on the next verification attempt. Consumption goes through the
/// store's conditional clear, so concurrent verifies of the same token yield
/// exactly one winner.
#[derive(Clone)]
pub struct TokenLifecycleEngine {
    store: Arc<dyn CredentialStore>,
}

impl TokenLifecycleEngine {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Generate and persist a fresh token for `purpose`, superseding (and
    /// thereby invalidating) any outstanding token of the same purpose.
    pub async fn issue(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + ttl;
        self.store
            .set_token(user_id, purpose, &token, expires_at)
            .await?;
        debug!(%user_id, ?purpose, %expires_at, "token issued");
        Ok(token)
    }

    /// Check a token without consuming it. Used to gate the password-reset
    /// form before the actual reset submits.
    pub async fn peek(&self, token: &str, purpose: TokenPurpose) -> Result<User, AuthError> {
        let user = self
            .store
            .find_by_token(purpose, token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;
        if is_expired(user.token_expiry(purpose)) {
            return Err(AuthError::TokenExpired);
        }
        Ok(user)
    }

    /// Consume a token: single-use, checked against its expiry, race-safe.
    /// For `EmailVerification` the owning account is activated as part of
    /// successful consumption.
    ///
    /// "Never issued", "already consumed" and "superseded" all surface as
    /// `TokenNotFound`; only a token that is still current but past its
    /// expiry surfaces as `TokenExpired` (and is cleared, so a retry gets
    /// `TokenNotFound`).
    pub async fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<Uuid, AuthError> {
        let user = self
            .store
            .find_by_token(purpose, token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if is_expired(user.token_expiry(purpose)) {
            // Lazy invalidation; losing this race to another verifier is
            // fine, the outcome is the same.
            let _ = self.store.consume_token(purpose, token).await?;
            debug!(user_id = %user.id, ?purpose, "expired token cleared");
            return Err(AuthError::TokenExpired);
        }

        // The conditional clear decides the winner between concurrent
        // verifies of the same token.
        let user = self
            .store
            .consume_token(purpose, token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if purpose == TokenPurpose::EmailVerification {
            self.store.activate(user.id).await?;
            debug!(user_id = %user.id, "account activated");
        }

        debug!(user_id = %user.id, ?purpose, "token consumed");
        Ok(user.id)
    }
}

fn is_expired(expires_at: Option<OffsetDateTime>) -> bool {
    match expires_at {
        Some(at) => OffsetDateTime::now_utc() >= at,
        // A token without an expiry should not exist for these purposes;
        // treat it as expired rather than eternally valid.
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;

    async fn setup() -> (Arc<dyn CredentialStore>, TokenLifecycleEngine, Uuid) {
        let store = Arc::new(MemoryCredentialStore::new()) as Arc<dyn CredentialStore>;
        let engine = TokenLifecycleEngine::new(store.clone());
        let user = store
            .create("Bob", "bob@example.com", "hash")
            .await
            .expect("create user");
        (store, engine, user.id)
    }

    #[tokio::test]
    async fn verify_is_single_use() {
        let (_store, engine, user_id) = setup().await;
        let token = engine
            .issue(user_id, TokenPurpose::PasswordReset, Duration::seconds(60))
            .await
            .expect("issue");

        assert_eq!(
            engine
                .verify(&token, TokenPurpose::PasswordReset)
                .await
                .expect("first verify"),
            user_id
        );
        assert!(matches!(
            engine.verify(&token, TokenPurpose::PasswordReset).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn verify_activates_account_for_email_verification() {
        let (store, engine, user_id) = setup().await;
        let token = engine
            .issue(
                user_id,
                TokenPurpose::EmailVerification,
                Duration::seconds(60),
            )
            .await
            .expect("issue");

        engine
            .verify(&token, TokenPurpose::EmailVerification)
            .await
            .expect("verify");

        let user = store.find_by_id(user_id).await.unwrap().unwrap();
        assert!(user.active);
        assert!(user.verify_token.is_none());
        assert!(user.verify_token_expires.is_none());
    }

    #[tokio::test]
    async fn expired_token_fails_then_reads_as_not_found() {
        let (_store, engine, user_id) = setup().await;
        let token = engine
            .issue(user_id, TokenPurpose::PasswordReset, Duration::seconds(-1))
            .await
            .expect("issue");

        assert!(matches!(
            engine.verify(&token, TokenPurpose::PasswordReset).await,
            Err(AuthError::TokenExpired)
        ));
        // Lazily cleared on first attempt.
        assert!(matches!(
            engine.verify(&token, TokenPurpose::PasswordReset).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn reissue_supersedes_previous_token() {
        let (_store, engine, user_id) = setup().await;
        let first = engine
            .issue(user_id, TokenPurpose::PasswordReset, Duration::seconds(60))
            .await
            .expect("issue first");
        let second = engine
            .issue(user_id, TokenPurpose::PasswordReset, Duration::seconds(60))
            .await
            .expect("issue second");

        assert!(matches!(
            engine.verify(&first, TokenPurpose::PasswordReset).await,
            Err(AuthError::TokenNotFound)
        ));
        assert_eq!(
            engine
                .verify(&second, TokenPurpose::PasswordReset)
                .await
                .expect("second still valid"),
            user_id
        );
    }

    #[tokio::test]
    async fn purposes_do_not_cross_verify() {
        let (_store, engine, user_id) = setup().await;
        let token = engine
            .issue(user_id, TokenPurpose::PasswordReset, Duration::seconds(60))
            .await
            .expect("issue");

        assert!(matches!(
            engine.verify(&token, TokenPurpose::EmailVerification).await,
            Err(AuthError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn peek_does_not_consume() {
        let (_store, engine, user_id) = setup().await;
        let token = engine
            .issue(user_id, TokenPurpose::PasswordReset, Duration::seconds(60))
            .await
            .expect("issue");

        engine
            .peek(&token, TokenPurpose::PasswordReset)
            .await
            .expect("peek");
        engine
            .peek(&token, TokenPurpose::PasswordReset)
            .await
            .expect("peek again");
        engine
            .verify(&token, TokenPurpose::PasswordReset)
            .await
            .expect("still consumable");
    }

    #[tokio::test]
    async fn concurrent_verifies_have_exactly_one_winner() {
        let (_store, engine, user_id) = setup().await;
        let token = engine
            .issue(
                user_id,
                TokenPurpose::EmailVerification,
                Duration::seconds(60),
            )
            .await
            .expect("issue");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                engine.verify(&token, TokenPurpose::EmailVerification).await
            }));
        }

        let mut successes = 0;
        let mut not_found = 0;
        for handle in handles {
            match handle.await.expect("task") {
                Ok(id) => {
                    assert_eq!(id, user_id);
                    successes += 1;
                }
                Err(AuthError::TokenNotFound) => not_found += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(not_found, 15);
    }

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
