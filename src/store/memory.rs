use std::collections::HashMap;

use anyhow::bail;
use axum::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CredentialStore, TokenPurpose, User};

/// In-memory store used by `AppState::fake()` and the test suites. A single
/// mutex guards the whole map, so every operation (including conditional
/// token consumption) is atomic by construction.
#[derive(Default)]
pub struct MemoryCredentialStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn slot_mut(user: &mut User, purpose: TokenPurpose) -> (&mut Option<String>, &mut Option<OffsetDateTime>) {
    match purpose {
        TokenPurpose::EmailVerification => (&mut user.verify_token, &mut user.verify_token_expires),
        TokenPurpose::PasswordReset => (&mut user.reset_token, &mut user.reset_token_expires),
        TokenPurpose::Remember => (&mut user.remember_token, &mut user.remember_token_expires),
    }
}

fn slot(user: &User, purpose: TokenPurpose) -> &Option<String> {
    match purpose {
        TokenPurpose::EmailVerification => &user.verify_token,
        TokenPurpose::PasswordReset => &user.reset_token,
        TokenPurpose::Remember => &user.remember_token,
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.get(&id).cloned())
    }

    async fn find_by_token(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|u| slot(u, purpose).as_deref() == Some(token))
            .cloned())
    }

    async fn create(&self, name: &str, email: &str, password_hash: &str) -> anyhow::Result<User> {
        let mut users = self.users.lock().await;
        if users.values().any(|u| u.email == email) {
            // Mirrors the UNIQUE constraint on users.email in Postgres.
            bail!("duplicate email: {email}");
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            email: email.to_owned(),
            password_hash: password_hash.to_owned(),
            active: false,
            verify_token: None,
            verify_token_expires: None,
            reset_token: None,
            reset_token_expires: None,
            remember_token: None,
            remember_token_expires: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_token(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&user_id) {
            let (tok, exp) = slot_mut(user, purpose);
            *tok = Some(token.to_owned());
            *exp = Some(expires_at);
        }
        Ok(())
    }

    async fn consume_token(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().await;
        let holder = users
            .values_mut()
            .find(|u| slot(&**u, purpose).as_deref() == Some(token));
        match holder {
            Some(user) => {
                let (tok, exp) = slot_mut(user, purpose);
                *tok = None;
                *exp = None;
                Ok(Some(user.clone()))
            }
            None => Ok(None),
        }
    }

    async fn clear_token(&self, user_id: Uuid, purpose: TokenPurpose) -> anyhow::Result<()> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&user_id) {
            let (tok, exp) = slot_mut(user, purpose);
            *tok = None;
            *exp = None;
        }
        Ok(())
    }

    async fn activate(&self, user_id: Uuid) -> anyhow::Result<()> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&user_id) {
            user.active = true;
        }
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&user_id) {
            user.password_hash = password_hash.to_owned();
            user.reset_token = None;
            user.reset_token_expires = None;
        }
        Ok(())
    }
}
