use std::fmt;

use serde::{Deserialize, Serialize};

use super::repo_types::User;
use crate::config::redact;

/// Request body for signup.
#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .finish()
    }
}

/// Request body for login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .finish()
    }
}

/// Request body for a password change.
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePasswordRequest")
            .field("current_password", &redact(&self.current_password))
            .field("new_password", &redact(&self.new_password))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct ForgotRequest {
    pub email: String,
}

/// Request body completing a password reset.
#[derive(Deserialize)]
pub struct ResetRequest {
    pub token: String,
    pub password: String,
}

impl fmt::Debug for ResetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetRequest")
            .field("token", &redact(&self.token))
            .field("password", &redact(&self.password))
            .finish()
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id(),
            name: u.name.clone(),
            email: u.email.clone(),
        }
    }
}
