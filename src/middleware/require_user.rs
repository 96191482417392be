use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::RequestFilter;
use crate::auth::extractors::CurrentUser;

pub const LOGIN_PATH: &str = "/login";

/// `302 Found` pointing at the login page.
pub fn redirect_to_login() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, LOGIN_PATH)]).into_response()
}

/// Sends anonymous requests to the login page. Must run after `UserFilter`.
#[derive(Clone, Copy, Default)]
pub struct RequireUser;

#[async_trait]
impl RequestFilter for RequireUser {
    async fn process(&self, req: Request, next: Next) -> Response {
        if req.extensions().get::<CurrentUser>().is_none() {
            debug!(path = %req.uri().path(), "no identity, redirecting to login");
            return redirect_to_login();
        }
        next.run(req).await
    }
}
