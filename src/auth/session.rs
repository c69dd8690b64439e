use std::sync::Arc;

use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::config::JwtConfig;
use crate::store::CredentialStore;

/// JWT payload for the stateless session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

/// Signing and verification keys plus the claims configuration.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: Duration::minutes(config.ttl_minutes),
        }
    }

    pub fn sign(&self, user_id: Uuid) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: (now + self.ttl).unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Store(e.into()))?;
        debug!(%user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data =
            decode::<Claims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
                _ => AuthError::TokenMalformed,
            })?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

/// Read-side check performed on every protected request: cryptographic
/// verification of the presented bearer token, then resolution of its
/// subject to a live user. Never mutates persisted state.
#[derive(Clone)]
pub struct BearerSessionValidator {
    store: Arc<dyn CredentialStore>,
    keys: JwtKeys,
}

impl BearerSessionValidator {
    pub fn new(store: Arc<dyn CredentialStore>, config: &JwtConfig) -> Self {
        Self {
            store,
            keys: JwtKeys::new(config),
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// `TokenMissing` when no token was presented; signature/expiry failures
    /// from `JwtKeys::verify`; `UserNotFound` when the subject was deleted
    /// after the token was signed.
    pub async fn validate(&self, token: Option<&str>) -> Result<Uuid, AuthError> {
        let token = token.ok_or(AuthError::TokenMissing)?;
        let claims = self.keys.verify(token)?;
        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::new(&state.config.jwt)
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
    }

    #[test]
    fn verify_rejects_garbage_as_malformed() {
        let keys = make_keys();
        assert!(matches!(
            keys.verify("not-a-jwt"),
            Err(AuthError::TokenMalformed)
        ));
    }

    #[test]
    fn verify_rejects_wrong_secret_signature() {
        let keys = make_keys();
        let other = JwtKeys::new(&crate::config::JwtConfig {
            secret: "different".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
        });
        let token = other.sign(Uuid::new_v4()).expect("sign");
        assert!(matches!(
            keys.verify(&token),
            Err(AuthError::SignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn validate_requires_a_token() {
        let state = AppState::fake();
        let validator = state.session_validator();
        assert!(matches!(
            validator.validate(None).await,
            Err(AuthError::TokenMissing)
        ));
    }

    #[tokio::test]
    async fn validate_resolves_subject_through_store() {
        let state = AppState::fake();
        let validator = state.session_validator();
        let user = state
            .store
            .create("Bob", "bob@example.com", "hash")
            .await
            .expect("create");

        let token = validator.keys().sign(user.id).expect("sign");
        let id = validator.validate(Some(&token)).await.expect("validate");
        assert_eq!(id, user.id);
    }

    #[tokio::test]
    async fn validate_rejects_deleted_subject() {
        let state = AppState::fake();
        let validator = state.session_validator();
        // A well-signed token whose subject never existed in the store.
        let token = validator.keys().sign(Uuid::new_v4()).expect("sign");
        assert!(matches!(
            validator.validate(Some(&token)).await,
            Err(AuthError::UserNotFound)
        ));
    }
}
