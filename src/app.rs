use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::AppConfig;
use crate::middleware::{FilterPipeline, RequireUser, UserFilter};
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    let protected = FilterPipeline::new()
        .with(RequireUser)
        .guard(auth::protected_router());

    let routes = Router::new()
        .merge(auth::public_router())
        .merge(protected)
        .route("/health", get(|| async { "ok" }))
        .with_state(state.clone());

    FilterPipeline::new()
        .with(UserFilter::new(state.users))
        .wrap(routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
