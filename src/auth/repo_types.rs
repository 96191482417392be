use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};

use crate::config::redact;

/// Identity and bookkeeping columns shared by every persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Model {
    pub id: i64,                      // BIGSERIAL, never reused
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Model {
    /// A record that has not been inserted yet.
    pub fn unsaved() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }
}

/// User record in the database.
///
/// `password` and `remember` only ever live in memory: the store writes
/// `password_hash` and `remember_hash` instead.
#[derive(Clone, Serialize, FromRow)]
pub struct User {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub model: Model,
    pub name: String,
    pub email: String,
    #[sqlx(skip)]
    #[serde(skip)]
    pub password: String,
    #[serde(skip_serializing)]
    pub password_hash: String,        // peppered Argon2 PHC string
    #[sqlx(skip)]
    #[serde(skip)]
    pub remember: String,
    #[serde(skip_serializing)]
    pub remember_hash: String,        // HMAC-SHA256 of `remember`
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            model: Model::unsaved(),
            name: name.into(),
            email: email.into(),
            password: password.into(),
            password_hash: String::new(),
            remember: String::new(),
            remember_hash: String::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.model.id
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("model", &self.model)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .field("password_hash", &redact(&self.password_hash))
            .field("remember", &redact(&self.remember))
            .field("remember_hash", &redact(&self.remember_hash))
            .finish()
    }
}

/// How long a password-reset token stays usable.
pub const RESET_TOKEN_TTL: Duration = Duration::hours(12);

/// Pending password reset. Only `token_hash` is stored; `token` goes to the user.
#[derive(Clone, FromRow)]
pub struct PasswordReset {
    #[sqlx(flatten)]
    pub model: Model,
    pub user_id: i64,
    #[sqlx(skip)]
    pub token: String,
    pub token_hash: String,
}

impl PasswordReset {
    pub fn new(user_id: i64, token: String, token_hash: String) -> Self {
        Self {
            model: Model::unsaved(),
            user_id,
            token,
            token_hash,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now - self.model.created_at > RESET_TOKEN_TTL
    }
}

impl fmt::Debug for PasswordReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordReset")
            .field("model", &self.model)
            .field("user_id", &self.user_id)
            .field("token", &redact(&self.token))
            .field("token_hash", &redact(&self.token_hash))
            .finish()
    }
}
