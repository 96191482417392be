use crate::state::AppState;
use axum::Router;

mod dto;
pub mod error;
pub(crate) mod extractors;
pub mod handlers;
#[cfg(test)]
pub(crate) mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod reset;
pub mod services;
pub mod token;

pub use reset::ResetService;
pub use services::UserService;

/// Routes open to anonymous visitors.
pub fn public_router() -> Router<AppState> {
    handlers::public_routes()
}

/// Routes that need a signed-in user; wrap with `RequireUser`.
pub fn protected_router() -> Router<AppState> {
    handlers::account_routes()
}
