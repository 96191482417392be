//! Forgotten-password flow.
//!
//! `initiate_reset` stores the HMAC of a fresh random token and hands the raw
//! token to a [`ResetMailer`]. `complete_reset` looks the token up by that
//! hash, consumes it, sets the new password and signs the user in.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use crate::auth::{
    error::AuthError,
    repo::{ResetStore, StoreError},
    repo_types::{PasswordReset, User},
    services::UserService,
};

/// Path the reset link points at.
pub const RESET_PATH: &str = "/reset";

/// Delivers a reset token to its user.
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send_reset(&self, user: &User, token: &str) -> anyhow::Result<()>;
}

/// Writes the reset link to the log instead of sending mail.
#[derive(Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl ResetMailer for LogMailer {
    async fn send_reset(&self, user: &User, token: &str) -> anyhow::Result<()> {
        info!(
            user_id = user.id(),
            email = %user.email,
            link = %format!("{RESET_PATH}?token={token}"),
            "password reset link issued"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct ResetService {
    users: UserService,
    store: Arc<dyn ResetStore>,
    mailer: Arc<dyn ResetMailer>,
}

impl ResetService {
    pub fn new(
        users: UserService,
        store: Arc<dyn ResetStore>,
        mailer: Arc<dyn ResetMailer>,
    ) -> Self {
        Self {
            users,
            store,
            mailer,
        }
    }

    /// Mint a reset token for the account behind `email` and deliver it.
    #[instrument(skip(self))]
    pub async fn initiate_reset(&self, email: &str) -> Result<(), AuthError> {
        let user = self.users.by_email(email).await?;

        let tokens = self.users.tokens();
        let token = tokens.generate_token()?;
        let token_hash = tokens.derive_lookup_hash(&token);
        let reset = self
            .store
            .insert_reset(&PasswordReset::new(user.id(), token.clone(), token_hash))
            .await?;

        self.mailer
            .send_reset(&user, &token)
            .await
            .map_err(|e| AuthError::Delivery(e.to_string()))?;
        debug!(user_id = user.id(), reset_id = reset.model.id, "reset initiated");
        Ok(())
    }

    /// Consume `token` and give its user `new_password` and a fresh session.
    ///
    /// Unknown, already used and expired tokens all yield `InvalidToken`.
    #[instrument(skip(self, token, new_password))]
    pub async fn complete_reset(&self, token: &str, new_password: &str) -> Result<User, AuthError> {
        let token_hash = self.users.tokens().derive_lookup_hash(token);
        let reset = self
            .store
            .find_reset(&token_hash)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::InvalidToken,
                other => other.into(),
            })?;
        self.store.delete_reset(reset.model.id).await?;

        if reset.is_expired(OffsetDateTime::now_utc()) {
            debug!(reset_id = reset.model.id, "reset token expired");
            return Err(AuthError::InvalidToken);
        }

        let mut user = self.users.by_id(reset.user_id).await.map_err(|e| match e {
            AuthError::NotFound => AuthError::InvalidToken,
            other => other,
        })?;
        user.password = new_password.to_string();
        let user = self.users.sign_in(user).await?;
        info!(user_id = user.id(), "password reset completed");
        Ok(user)
    }
}
