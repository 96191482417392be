use std::fmt;

use anyhow::Context;
use serde::Deserialize;

/// Placeholder printed by `Debug` impls in place of a secret value.
pub(crate) fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "[redacted]"
    }
}

/// Process-wide secrets, loaded once at startup and never rotated at runtime.
#[derive(Clone, Deserialize)]
pub struct SecretsConfig {
    pub pepper: String,
    pub hmac_key: String,
}

impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("pepper", &redact(&self.pepper))
            .field("hmac_key", &redact(&self.hmac_key))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub secrets: SecretsConfig,
    pub host: String,
    pub port: u16,
    pub production: bool,
    pub reset_db: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| var(key).with_context(|| format!("{key} must be set"));

        let secrets = SecretsConfig {
            pepper: required("PASSWORD_PEPPER")?,
            hmac_key: required("HMAC_SECRET_KEY")?,
        };
        anyhow::ensure!(!secrets.pepper.is_empty(), "PASSWORD_PEPPER must not be empty");
        anyhow::ensure!(!secrets.hmac_key.is_empty(), "HMAC_SECRET_KEY must not be empty");

        let port = match var("APP_PORT") {
            Some(v) => v.parse::<u16>().context("APP_PORT must be a port number")?,
            None => 3000,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            secrets,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            production: var("APP_ENV").map(|v| v == "prod").unwrap_or(false),
            reset_db: var("DB_RESET").map(|v| v == "true").unwrap_or(false),
        })
    }
}
