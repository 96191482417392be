use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::auth::{
    error::AuthError,
    password::PasswordHasher,
    repo::{UserQuery, UserStore},
    repo_types::User,
    token::RememberTokens,
};
use crate::config::SecretsConfig;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails are compared trimmed and lowercased everywhere.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Credential and session authority for users.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    passwords: PasswordHasher,
    tokens: RememberTokens,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, secrets: &SecretsConfig) -> Result<Self, AuthError> {
        let tokens = RememberTokens::new(secrets)?;
        Ok(Self::with_tokens(store, secrets, tokens))
    }

    pub fn with_tokens(
        store: Arc<dyn UserStore>,
        secrets: &SecretsConfig,
        tokens: RememberTokens,
    ) -> Self {
        Self {
            store,
            passwords: PasswordHasher::new(secrets),
            tokens,
        }
    }

    pub(crate) fn tokens(&self) -> &RememberTokens {
        &self.tokens
    }

    pub async fn by_id(&self, id: i64) -> Result<User, AuthError> {
        Ok(self.store.find_one(&UserQuery::ById(id)).await?)
    }

    pub async fn by_email(&self, email: &str) -> Result<User, AuthError> {
        let query = UserQuery::ByEmail(normalize_email(email));
        Ok(self.store.find_one(&query).await?)
    }

    /// Resolve a presented remember token to its user.
    pub async fn by_remember(&self, token: &str) -> Result<User, AuthError> {
        let hash = self.tokens.derive_lookup_hash(token);
        Ok(self.store.find_one(&UserQuery::ByRememberHash(hash)).await?)
    }

    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self.by_email(email).await?;
        self.passwords.verify(password, &user.password_hash)?;
        debug!(user_id = user.id(), "password verified");
        Ok(user)
    }

    /// Make sure `user` carries a plaintext remember token and its matching hash.
    ///
    /// An existing token is kept; clear `user.remember` first to force a new one.
    pub fn issue_remember(&self, user: &mut User) -> Result<(), AuthError> {
        if user.remember.is_empty() {
            user.remember = self.tokens.generate_token()?;
        }
        user.remember_hash = self.tokens.derive_lookup_hash(&user.remember);
        Ok(())
    }

    /// Hash the password, mint a remember token and insert the user.
    ///
    /// The returned user still carries the plaintext token for the caller.
    #[instrument(skip(self, user), fields(email = %user.email))]
    pub async fn create(&self, mut user: User) -> Result<User, AuthError> {
        user.email = normalize_email(&user.email);
        user.password_hash = self.passwords.hash(&user.password)?;
        user.password.clear();
        self.issue_remember(&mut user)?;

        let mut stored = self.store.insert(&user).await?;
        stored.remember = user.remember;
        info!(user_id = stored.id(), "user created");
        Ok(stored)
    }

    /// Persist changes, rehashing any plaintext password or token present.
    #[instrument(skip(self, user), fields(user_id = user.id()))]
    pub async fn update(&self, mut user: User) -> Result<User, AuthError> {
        if !user.model.is_persisted() {
            return Err(AuthError::InvalidId);
        }
        user.email = normalize_email(&user.email);
        if !user.password.is_empty() {
            user.password_hash = self.passwords.hash(&user.password)?;
            user.password.clear();
        }
        if !user.remember.is_empty() {
            user.remember_hash = self.tokens.derive_lookup_hash(&user.remember);
        }

        let mut stored = self.store.save(&user).await?;
        stored.remember = user.remember;
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), AuthError> {
        if id <= 0 {
            return Err(AuthError::InvalidId);
        }
        self.store.delete_by_id(id).await?;
        info!(user_id = id, "user deleted");
        Ok(())
    }

    /// Start a session: issue a fresh token and store its hash.
    pub async fn sign_in(&self, mut user: User) -> Result<User, AuthError> {
        user.remember.clear();
        self.issue_remember(&mut user)?;
        self.update(user).await
    }

    /// End a session by rotating the token so the old cookie stops resolving.
    pub async fn sign_out(&self, user: User) -> Result<(), AuthError> {
        self.sign_in(user).await.map(|_| ())
    }

    #[instrument(skip(self, user, current, new), fields(user_id = user.id()))]
    pub async fn change_password(
        &self,
        user: &User,
        current: &str,
        new: &str,
    ) -> Result<User, AuthError> {
        let mut fresh = self.authenticate(&user.email, current).await?;
        fresh.password = new.to_string();
        fresh.remember.clear();
        self.issue_remember(&mut fresh)?;
        self.update(fresh).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::memory::InMemoryUserStore;
    use crate::auth::repo::StoreError;
    use crate::auth::token::tests::FailingRng;

    pub(crate) fn secrets() -> SecretsConfig {
        SecretsConfig {
            pepper: "test-pepper".into(),
            hmac_key: "test-hmac-key".into(),
        }
    }

    fn service() -> (UserService, Arc<InMemoryUserStore>) {
        let store = Arc::new(InMemoryUserStore::new());
        let svc = UserService::new(store.clone(), &secrets()).unwrap();
        (svc, store)
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("not an email"));
    }

    #[tokio::test]
    async fn create_then_authenticate() {
        let (svc, _) = service();
        let created = svc
            .create(User::new("", "a@b.com", "secret123"))
            .await
            .unwrap();
        assert!(created.id() > 0);

        let found = svc.authenticate("a@b.com", "secret123").await.unwrap();
        assert_eq!(found.id(), created.id());

        let err = svc.authenticate("a@b.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn create_clears_plaintext_password() {
        let (svc, _) = service();
        let created = svc
            .create(User::new("Ann", "ann@example.com", "secret123"))
            .await
            .unwrap();
        assert!(created.password.is_empty());
        assert!(!created.password_hash.is_empty());
        assert_ne!(created.password_hash, "secret123");
    }

    #[tokio::test]
    async fn authenticate_unknown_email_is_not_found() {
        let (svc, _) = service();
        let err = svc.authenticate("nobody@example.com", "x").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn email_is_normalized() {
        let (svc, _) = service();
        let created = svc
            .create(User::new("", "  Mixed@Example.COM ", "secret123"))
            .await
            .unwrap();
        assert_eq!(created.email, "mixed@example.com");
        let found = svc.authenticate("MIXED@example.com", "secret123").await.unwrap();
        assert_eq!(found.id(), created.id());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_persistence_error() {
        let (svc, _) = service();
        svc.create(User::new("", "dup@example.com", "secret123"))
            .await
            .unwrap();
        let err = svc
            .create(User::new("", "DUP@example.com", "other-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Persistence(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn create_mints_token_and_resolves_it() {
        let (svc, _) = service();
        let created = svc
            .create(User::new("", "t@example.com", "secret123"))
            .await
            .unwrap();
        assert!(!created.remember.is_empty());

        let found = svc.by_remember(&created.remember).await.unwrap();
        assert_eq!(found.id(), created.id());
        // the stored copy never carries the plaintext token
        assert!(found.remember.is_empty());
    }

    #[tokio::test]
    async fn create_keeps_presupplied_token() {
        let (svc, _) = service();
        let mut user = User::new("", "pre@example.com", "secret123");
        user.remember = "pre-supplied-token".into();
        let created = svc.create(user).await.unwrap();
        assert_eq!(created.remember, "pre-supplied-token");
        assert!(svc.by_remember("pre-supplied-token").await.is_ok());
    }

    #[test]
    fn issue_remember_is_idempotent_for_an_existing_token() {
        let (svc, _) = service();
        let mut user = User::new("", "i@example.com", "secret123");
        svc.issue_remember(&mut user).unwrap();
        let (token, hash) = (user.remember.clone(), user.remember_hash.clone());
        assert!(!token.is_empty());

        svc.issue_remember(&mut user).unwrap();
        assert_eq!(user.remember, token);
        assert_eq!(user.remember_hash, hash);

        user.remember.clear();
        svc.issue_remember(&mut user).unwrap();
        assert_ne!(user.remember, token);
        assert_ne!(user.remember_hash, hash);
    }

    #[tokio::test]
    async fn entropy_failure_aborts_before_any_write() {
        let store = Arc::new(InMemoryUserStore::new());
        let tokens = RememberTokens::with_rng(&secrets(), FailingRng).unwrap();
        let svc = UserService::with_tokens(store.clone(), &secrets(), tokens);

        let mut user = User::new("", "e@example.com", "secret123");
        let err = svc.issue_remember(&mut user).unwrap_err();
        assert!(matches!(err, AuthError::EntropySource(_)));
        assert!(user.remember.is_empty());
        assert!(user.remember_hash.is_empty());

        let err = svc
            .create(User::new("", "e@example.com", "secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EntropySource(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn token_resolves_from_a_fresh_service() {
        let (svc, store) = service();
        let created = svc
            .create(User::new("", "fresh@example.com", "secret123"))
            .await
            .unwrap();
        let signed_in = svc.sign_in(created.clone()).await.unwrap();

        // a new request builds nothing but a lookup against the same store
        let other = UserService::new(store, &secrets()).unwrap();
        let found = other.by_remember(&signed_in.remember).await.unwrap();
        assert_eq!(found.id(), created.id());
    }

    #[tokio::test]
    async fn resolve_unknown_token_is_not_found() {
        let (svc, _) = service();
        svc.create(User::new("", "x@example.com", "secret123"))
            .await
            .unwrap();
        let err = svc.by_remember("not-a-real-token").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn sign_in_rotates_and_sign_out_invalidates() {
        let (svc, _) = service();
        let created = svc
            .create(User::new("", "s@example.com", "secret123"))
            .await
            .unwrap();
        let first = created.remember.clone();

        let signed_in = svc.sign_in(created).await.unwrap();
        assert_ne!(signed_in.remember, first);
        assert!(matches!(
            svc.by_remember(&first).await.unwrap_err(),
            AuthError::NotFound
        ));

        let current = signed_in.remember.clone();
        svc.sign_out(signed_in).await.unwrap();
        assert!(matches!(
            svc.by_remember(&current).await.unwrap_err(),
            AuthError::NotFound
        ));
    }

    #[tokio::test]
    async fn update_rehashes_new_token() {
        let (svc, _) = service();
        let mut user = svc
            .create(User::new("", "u@example.com", "secret123"))
            .await
            .unwrap();
        user.remember = "explicit-new-token".into();
        let updated = svc.update(user).await.unwrap();
        assert_eq!(updated.remember, "explicit-new-token");
        assert!(svc.by_remember("explicit-new-token").await.is_ok());
    }

    #[tokio::test]
    async fn update_rejects_unsaved_user() {
        let (svc, store) = service();
        let err = svc
            .update(User::new("", "new@example.com", "secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidId));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let (svc, _) = service();
        let user = svc
            .create(User::new("", "p@example.com", "secret123"))
            .await
            .unwrap();

        let err = svc
            .change_password(&user, "wrong", "new-secret-456")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        svc.change_password(&user, "secret123", "new-secret-456")
            .await
            .unwrap();
        assert!(svc.authenticate("p@example.com", "new-secret-456").await.is_ok());
        assert!(matches!(
            svc.authenticate("p@example.com", "secret123").await.unwrap_err(),
            AuthError::InvalidCredentials
        ));
    }

    #[tokio::test]
    async fn delete_zero_id_never_reaches_the_store() {
        let (svc, store) = service();
        let before = store.calls();
        let err = svc.delete(0).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidId));
        assert_eq!(store.calls(), before);
    }

    #[tokio::test]
    async fn delete_removes_the_user() {
        let (svc, _) = service();
        let user = svc
            .create(User::new("", "d@example.com", "secret123"))
            .await
            .unwrap();
        svc.delete(user.id()).await.unwrap();
        assert!(matches!(
            svc.by_id(user.id()).await.unwrap_err(),
            AuthError::NotFound
        ));

        // ids are not handed out again
        let next = svc
            .create(User::new("", "d@example.com", "secret123"))
            .await
            .unwrap();
        assert!(next.id() > user.id());
    }
}
