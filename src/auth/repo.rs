use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use crate::auth::repo_types::{PasswordReset, User};

/// Equality predicates the user store understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserQuery {
    ById(i64),
    ByEmail(String),
    ByRememberHash(String),
}

impl UserQuery {
    fn column(&self) -> &'static str {
        match self {
            UserQuery::ById(_) => "id",
            UserQuery::ByEmail(_) => "email",
            UserQuery::ByRememberHash(_) => "remember_hash",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("users").to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Persistence collaborator for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_one(&self, query: &UserQuery) -> Result<User, StoreError>;
    /// Insert a new row and return it with its assigned id and timestamps.
    async fn insert(&self, user: &User) -> Result<User, StoreError>;
    async fn save(&self, user: &User) -> Result<User, StoreError>;
    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError>;
}

/// Persistence for pending password resets.
#[async_trait]
pub trait ResetStore: Send + Sync {
    async fn insert_reset(&self, reset: &PasswordReset) -> Result<PasswordReset, StoreError>;
    async fn find_reset(&self, token_hash: &str) -> Result<PasswordReset, StoreError>;
    async fn delete_reset(&self, id: i64) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str =
    "id, created_at, updated_at, name, email, password_hash, remember_hash";

const RESET_COLUMNS: &str = "id, created_at, updated_at, user_id, token_hash";

/// Stores backed by the `users` and `password_resets` tables in Postgres.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_one(&self, query: &UserQuery) -> Result<User, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} = $1 LIMIT 1",
            query.column()
        );
        let stmt = sqlx::query_as::<_, User>(&sql);
        let stmt = match query {
            UserQuery::ById(id) => stmt.bind(*id),
            UserQuery::ByEmail(email) => stmt.bind(email.clone()),
            UserQuery::ByRememberHash(hash) => stmt.bind(hash.clone()),
        };
        let user = stmt.fetch_optional(&self.db).await?;
        user.ok_or(StoreError::NotFound)
    }

    async fn insert(&self, user: &User) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, remember_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.remember_hash)
            .fetch_one(&self.db)
            .await?;
        debug!(user_id = row.model.id, "user row inserted");
        Ok(row)
    }

    async fn save(&self, user: &User) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = $2, email = $3, password_hash = $4, remember_hash = $5,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(user.model.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.remember_hash)
            .fetch_optional(&self.db)
            .await?;
        row.ok_or(StoreError::NotFound)
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        debug!(user_id = id, rows = res.rows_affected(), "user row deleted");
        Ok(())
    }
}

#[async_trait]
impl ResetStore for PgUserStore {
    async fn insert_reset(&self, reset: &PasswordReset) -> Result<PasswordReset, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO password_resets (user_id, token_hash)
            VALUES ($1, $2)
            RETURNING {RESET_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PasswordReset>(&sql)
            .bind(reset.user_id)
            .bind(&reset.token_hash)
            .fetch_one(&self.db)
            .await?;
        debug!(reset_id = row.model.id, user_id = row.user_id, "reset row inserted");
        Ok(row)
    }

    async fn find_reset(&self, token_hash: &str) -> Result<PasswordReset, StoreError> {
        let sql = format!("SELECT {RESET_COLUMNS} FROM password_resets WHERE token_hash = $1");
        let row = sqlx::query_as::<_, PasswordReset>(&sql)
            .bind(token_hash)
            .fetch_optional(&self.db)
            .await?;
        row.ok_or(StoreError::NotFound)
    }

    async fn delete_reset(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM password_resets WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
