//! Request filters.
//!
//! Each filter gets the request and the rest of the chain, and decides whether
//! and how to call it. [`FilterPipeline`] turns an ordered list of filters into
//! axum middleware; the first filter pushed sees the request first.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    Router,
};

pub mod cookie;
mod require_user;
mod user;

pub use require_user::{redirect_to_login, RequireUser, LOGIN_PATH};
pub use user::UserFilter;

#[async_trait]
pub trait RequestFilter: Send + Sync + 'static {
    async fn process(&self, req: Request, next: Next) -> Response;
}

#[derive(Clone, Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn RequestFilter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl RequestFilter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Wrap every route of `router`, fallback included.
    pub fn wrap<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // axum runs the last layer added first
        self.filters.into_iter().rev().fold(router, |router, filter| {
            router.layer(middleware::from_fn(move |req: Request, next: Next| {
                let filter = Arc::clone(&filter);
                async move { filter.process(req, next).await }
            }))
        })
    }

    /// Wrap only the routes of `router` that match; unknown paths still 404.
    pub fn guard<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.filters.into_iter().rev().fold(router, |router, filter| {
            router.route_layer(middleware::from_fn(move |req: Request, next: Next| {
                let filter = Arc::clone(&filter);
                async move { filter.process(req, next).await }
            }))
        })
    }
}
