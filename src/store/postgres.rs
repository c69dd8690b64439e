use axum::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{CredentialStore, TokenPurpose, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, active, \
     verify_token, verify_token_expires, reset_token, reset_token_expires, \
     remember_token, remember_token_expires, created_at";

/// (token column, expiry column) for a purpose. Static strings only, so the
/// formatted queries below stay injection-free.
const fn columns(purpose: TokenPurpose) -> (&'static str, &'static str) {
    match purpose {
        TokenPurpose::EmailVerification => ("verify_token", "verify_token_expires"),
        TokenPurpose::PasswordReset => ("reset_token", "reset_token_expires"),
        TokenPurpose::Remember => ("remember_token", "remember_token_expires"),
    }
}

/// sqlx-backed store. Token consumption relies on the conditional
/// `UPDATE ... WHERE <token column> = $1` hitting at most one row, which
/// Postgres serializes for us.
#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_token(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> anyhow::Result<Option<User>> {
        let (token_col, _) = columns(purpose);
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {token_col} = $1"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, name: &str, email: &str, password_hash: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash, active)
             VALUES ($1, $2, $3, FALSE)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn set_token(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let (token_col, expires_col) = columns(purpose);
        sqlx::query(&format!(
            "UPDATE users SET {token_col} = $1, {expires_col} = $2 WHERE id = $3"
        ))
        .bind(token)
        .bind(expires_at)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn consume_token(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> anyhow::Result<Option<User>> {
        let (token_col, expires_col) = columns(purpose);
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET {token_col} = NULL, {expires_col} = NULL
             WHERE {token_col} = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn clear_token(&self, user_id: Uuid, purpose: TokenPurpose) -> anyhow::Result<()> {
        let (token_col, expires_col) = columns(purpose);
        sqlx::query(&format!(
            "UPDATE users SET {token_col} = NULL, {expires_col} = NULL WHERE id = $1"
        ))
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn activate(&self, user_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET active = TRUE WHERE id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $1, reset_token = NULL, reset_token_expires = NULL
             WHERE id = $2",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
