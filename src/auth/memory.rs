use std::sync::{
    atomic::{AtomicI64, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::reset::ResetMailer;
use super::repo::{ResetStore, StoreError, UserQuery, UserStore};
use super::repo_types::{PasswordReset, User};

/// In-process stores with the same uniqueness and cascade rules as the tables.
#[derive(Default)]
pub struct InMemoryUserStore {
    rows: RwLock<Vec<User>>,
    resets: RwLock<Vec<PasswordReset>>,
    next_id: AtomicI64,
    calls: AtomicUsize,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store operations issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_unique(rows: &[User], user: &User) -> Result<(), StoreError> {
        for row in rows.iter().filter(|r| r.model.id != user.model.id) {
            if row.email == user.email {
                return Err(StoreError::Conflict("users_email_key".into()));
            }
            if row.remember_hash == user.remember_hash {
                return Err(StoreError::Conflict("users_remember_hash_key".into()));
            }
        }
        Ok(())
    }
}

fn matches(query: &UserQuery, user: &User) -> bool {
    match query {
        UserQuery::ById(id) => user.model.id == *id,
        UserQuery::ByEmail(email) => user.email == *email,
        UserQuery::ByRememberHash(hash) => user.remember_hash == *hash,
    }
}

fn stored_copy(user: &User) -> User {
    let mut row = user.clone();
    row.password.clear();
    row.remember.clear();
    row
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_one(&self, query: &UserQuery) -> Result<User, StoreError> {
        self.touch();
        let rows = self.rows.read().await;
        rows.iter()
            .find(|u| matches(query, u))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, user: &User) -> Result<User, StoreError> {
        self.touch();
        let mut rows = self.rows.write().await;
        let mut row = stored_copy(user);
        row.model.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Self::check_unique(&rows, &row)?;
        let now = OffsetDateTime::now_utc();
        row.model.created_at = now;
        row.model.updated_at = now;
        rows.push(row.clone());
        Ok(row)
    }

    async fn save(&self, user: &User) -> Result<User, StoreError> {
        self.touch();
        let mut rows = self.rows.write().await;
        Self::check_unique(&rows, user)?;
        let slot = rows
            .iter_mut()
            .find(|r| r.model.id == user.model.id)
            .ok_or(StoreError::NotFound)?;
        let mut row = stored_copy(user);
        row.model.created_at = slot.model.created_at;
        row.model.updated_at = OffsetDateTime::now_utc();
        *slot = row.clone();
        Ok(row)
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        self.touch();
        self.rows.write().await.retain(|r| r.model.id != id);
        self.resets.write().await.retain(|r| r.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl ResetStore for InMemoryUserStore {
    async fn insert_reset(&self, reset: &PasswordReset) -> Result<PasswordReset, StoreError> {
        self.touch();
        let mut resets = self.resets.write().await;
        if resets.iter().any(|r| r.token_hash == reset.token_hash) {
            return Err(StoreError::Conflict("password_resets_token_hash_key".into()));
        }
        let mut row = reset.clone();
        row.token.clear();
        row.model.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = OffsetDateTime::now_utc();
        row.model.created_at = now;
        row.model.updated_at = now;
        resets.push(row.clone());
        Ok(row)
    }

    async fn find_reset(&self, token_hash: &str) -> Result<PasswordReset, StoreError> {
        self.touch();
        self.resets
            .read()
            .await
            .iter()
            .find(|r| r.token_hash == token_hash)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_reset(&self, id: i64) -> Result<(), StoreError> {
        self.touch();
        self.resets.write().await.retain(|r| r.model.id != id);
        Ok(())
    }
}

impl InMemoryUserStore {
    /// Backdate a pending reset, for expiry checks.
    pub async fn age_reset(&self, token_hash: &str, by: time::Duration) {
        for r in self.resets.write().await.iter_mut() {
            if r.token_hash == token_hash {
                r.model.created_at -= by;
            }
        }
    }
}

/// `ResetMailer` that keeps every delivered `(email, token)` pair.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
}

impl Outbox {
    pub fn last(&self) -> Option<(String, String)> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ResetMailer for Outbox {
    async fn send_reset(&self, user: &User, token: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((user.email.clone(), token.to_string()));
        Ok(())
    }
}
