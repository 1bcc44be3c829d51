//! HTTP surface of the broker.
//!
//! - `grant` routes (`/token`, `/device`, `/callback`)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration, served with Redoc at `/api-docs`

pub mod health;
pub mod openapi;

pub use health::MISC_TAG;

use crate::grant::{self, GrantState, responses};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Assemble the full application router.
///
/// Unknown paths and unsupported methods answer `405` with the same headers as
/// every other JSON error.
pub fn router(state: GrantState) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(grant::router(state))
        .routes(routes!(health::health))
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router
        .merge(Redoc::with_url("/api-docs", api))
        .method_not_allowed_fallback(responses::method_not_allowed)
        .fallback(responses::method_not_allowed)
}

/// Starts the web server on `listen_addr`.
#[tracing::instrument(skip(state))]
pub async fn start_webserver(state: GrantState, listen_addr: &str) -> color_eyre::Result<()> {
    let router = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Server running");
    axum::serve(listener, router)
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
