use argon2::{
    password_hash::{self, rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

use crate::auth::error::AuthError;
use crate::config::SecretsConfig;

/// Argon2 hashing of `password + pepper`.
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: String,
}

impl PasswordHasher {
    pub fn new(secrets: &SecretsConfig) -> Self {
        Self {
            pepper: secrets.pepper.clone(),
        }
    }

    fn peppered(&self, plain: &str) -> String {
        let mut buf = String::with_capacity(plain.len() + self.pepper.len());
        buf.push_str(plain);
        buf.push_str(&self.pepper);
        buf
    }

    pub fn hash(&self, plain: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(self.peppered(plain).as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                AuthError::Hashing(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// `Ok(())` on match, `InvalidCredentials` on mismatch, `Hashing` for anything else.
    pub fn verify(&self, plain: &str, hash: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            AuthError::Hashing(e.to_string())
        })?;
        match Argon2::default().verify_password(self.peppered(plain).as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(password_hash::Error::Password) => Err(AuthError::InvalidCredentials),
            Err(e) => Err(AuthError::Hashing(e.to_string())),
        }
    }
}
