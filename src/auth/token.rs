//! Remember-me and password-reset tokens.
//!
//! The browser holds the raw token; the database only ever sees
//! `HMAC-SHA256(key, token)`, so a leaked table cannot be replayed as
//! cookies without the key as well.

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::error;

use crate::auth::error::AuthError;
use crate::config::SecretsConfig;

type HmacSha256 = Hmac<Sha256>;

type SharedRng = Arc<Mutex<dyn RngCore + Send>>;

/// Bytes of entropy in a remember token.
pub const REMEMBER_TOKEN_BYTES: usize = 32;

/// URL-safe token filled from `rng`. A failing source aborts; there is no fallback.
pub fn generate_token_with<R: RngCore + ?Sized>(rng: &mut R) -> Result<String, AuthError> {
    let mut buf = [0u8; REMEMBER_TOKEN_BYTES];
    rng.try_fill_bytes(&mut buf).map_err(|e| {
        error!(error = %e, "random source failed");
        AuthError::EntropySource(e)
    })?;
    Ok(URL_SAFE.encode(buf))
}

#[derive(Clone)]
pub struct RememberTokens {
    mac: HmacSha256,
    rng: SharedRng,
}

impl RememberTokens {
    /// Tokens drawn from the OS random source.
    pub fn new(secrets: &SecretsConfig) -> Result<Self, AuthError> {
        Self::with_rng(secrets, OsRng)
    }

    pub fn with_rng(
        secrets: &SecretsConfig,
        rng: impl RngCore + Send + 'static,
    ) -> Result<Self, AuthError> {
        let mac = HmacSha256::new_from_slice(secrets.hmac_key.as_bytes())
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(Self {
            mac,
            rng: Arc::new(Mutex::new(rng)),
        })
    }

    pub fn generate_token(&self) -> Result<String, AuthError> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        generate_token_with(&mut *rng)
    }

    /// Deterministic, fixed-length lookup key for `token`.
    pub fn derive_lookup_hash(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        URL_SAFE.encode(mac.finalize().into_bytes())
    }
}
