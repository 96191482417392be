use async_trait::async_trait;
use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{debug, warn};

use super::{cookie, RequestFilter};
use crate::auth::{error::AuthError, extractors::CurrentUser, services::UserService};

/// Attaches the user behind the remember cookie, if any. Never rejects.
#[derive(Clone)]
pub struct UserFilter {
    users: UserService,
}

impl UserFilter {
    pub fn new(users: UserService) -> Self {
        Self { users }
    }
}

#[async_trait]
impl RequestFilter for UserFilter {
    async fn process(&self, mut req: Request, next: Next) -> Response {
        if let Some(token) = cookie::read(req.headers(), cookie::REMEMBER_COOKIE) {
            match self.users.by_remember(&token).await {
                Ok(user) => {
                    debug!(user_id = user.id(), "request identified");
                    req.extensions_mut().insert(CurrentUser(user));
                }
                Err(AuthError::NotFound) => debug!("remember cookie did not resolve"),
                Err(e) => warn!(error = %e, "remember token lookup failed"),
            }
        }
        next.run(req).await
    }
}
