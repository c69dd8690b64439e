use axum::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Which persisted token slot an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
    Remember,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub active: bool,
    pub verify_token: Option<String>,
    pub verify_token_expires: Option<OffsetDateTime>,
    pub reset_token: Option<String>,
    pub reset_token_expires: Option<OffsetDateTime>,
    pub remember_token: Option<String>,
    pub remember_token_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// Expiry of the currently outstanding token for `purpose`, if any.
    pub fn token_expiry(&self, purpose: TokenPurpose) -> Option<OffsetDateTime> {
        match purpose {
            TokenPurpose::EmailVerification => self.verify_token_expires,
            TokenPurpose::PasswordReset => self.reset_token_expires,
            TokenPurpose::Remember => self.remember_token_expires,
        }
    }
}

/// Persistence contract for user records and their token slots.
///
/// `consume_token` is the store's concurrency primitive: it must clear the
/// slot only if its current value still equals the presented token, so two
/// racing consumers see at most one success.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Find the user currently holding `token` in the slot for `purpose`.
    /// Does not mutate anything.
    async fn find_by_token(&self, purpose: TokenPurpose, token: &str)
        -> anyhow::Result<Option<User>>;

    /// Create an inactive user. Fails if the email is already taken.
    async fn create(&self, name: &str, email: &str, password_hash: &str) -> anyhow::Result<User>;

    /// Store `token` in the slot for `purpose`, superseding any prior token
    /// of the same purpose.
    async fn set_token(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()>;

    /// Atomically clear the slot for `purpose` iff it still holds `token`.
    /// Returns the owning user when this call is the one that cleared it,
    /// `None` when the token is absent or was already consumed.
    async fn consume_token(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> anyhow::Result<Option<User>>;

    /// Clear the slot for `purpose` unconditionally (logout).
    async fn clear_token(&self, user_id: Uuid, purpose: TokenPurpose) -> anyhow::Result<()>;

    /// Mark the account as verified.
    async fn activate(&self, user_id: Uuid) -> anyhow::Result<()>;

    /// Replace the password hash and clear any outstanding reset token in
    /// the same write, so a consumed reset token cannot be replayed.
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> anyhow::Result<()>;
}
