use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::tokens::generate_token;
use crate::store::{CredentialStore, TokenPurpose};

/// Rotating, replay-resistant persistent login.
///
/// Each consumption clears the stored token and issues a replacement in the
/// same operation, so a replayed old token is rejected after the legitimate
/// client has used it once. On top of the single-use rotation the token
/// carries a maximum lifetime, checked lazily at consumption.
#[derive(Clone)]
pub struct RememberMeRotator {
    store: Arc<dyn CredentialStore>,
    ttl: Duration,
}

impl RememberMeRotator {
    pub fn new(store: Arc<dyn CredentialStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Mint a new remember token for delivery as a durable client-side
    /// credential. Supersedes any previously issued one.
    pub async fn issue(&self, user_id: Uuid) -> Result<String, AuthError> {
        let token = generate_token();
        let expires_at = OffsetDateTime::now_utc() + self.ttl;
        self.store
            .set_token(user_id, TokenPurpose::Remember, &token, expires_at)
            .await?;
        debug!(%user_id, %expires_at, "remember token issued");
        Ok(token)
    }

    /// Authenticate by remember token and rotate it. Returns the user id and
    /// the replacement token, which must be re-delivered to the client.
    ///
    /// Every failure is `TokenInvalid`: unknown, already rotated and expired
    /// tokens are indistinguishable to the caller.
    pub async fn consume(&self, token: &str) -> Result<(Uuid, String), AuthError> {
        let user = self
            .store
            .find_by_token(TokenPurpose::Remember, token)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if let Some(expires_at) = user.token_expiry(TokenPurpose::Remember) {
            if OffsetDateTime::now_utc() >= expires_at {
                let _ = self
                    .store
                    .consume_token(TokenPurpose::Remember, token)
                    .await?;
                debug!(user_id = %user.id, "expired remember token cleared");
                return Err(AuthError::TokenInvalid);
            }
        }

        // Conditional clear: of two racing consumers, only one gets the user
        // back and proceeds to rotation.
        let user = self
            .store
            .consume_token(TokenPurpose::Remember, token)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        let next = self.issue(user.id).await?;
        debug!(user_id = %user.id, "remember token rotated");
        Ok((user.id, next))
    }

    /// Server-side invalidation on logout.
    pub async fn clear(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store
            .clear_token(user_id, TokenPurpose::Remember)
            .await?;
        debug!(%user_id, "remember token cleared");
        Ok(())
    }
}
