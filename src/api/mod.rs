//! HTTP surface: router assembly, request-id stamping, structured request
//! logging and graceful shutdown — the same shape as the reference
//! exporter's `exporter::new`, extended with the control-plane's own routes
//! and the `/api/operationmanagement` prefix.

mod dto;
mod handlers;
mod request_log;

use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::shutdown;
use crate::topology::Topology;
use anyhow::Result;
use axum::{
    Extension, Router,
    http::{HeaderName, HeaderValue},
    routing::{delete, get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::set_header::SetRequestHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use ulid::Ulid;

const PREFIX: &str = "/api/operationmanagement";

/// Builds the router without binding a listener, so integration tests can
/// drive it in-process via `tower::ServiceExt::oneshot` or a real bind.
#[must_use]
pub fn router(config: Arc<Config>, topology: Arc<Topology>, orchestrator: Arc<Orchestrator>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/overview", get(handlers::overview))
        .route("/promote/{node}", post(handlers::promote))
        .route("/demote-all", post(handlers::demote_all))
        .route("/hosts", post(handlers::add_host))
        .route("/hosts/{id}", delete(handlers::delete_host));

    Router::new().nest(PREFIX, api_routes).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(request_log::log_requests))
            .layer(Extension(config))
            .layer(Extension(topology))
            .layer(Extension(orchestrator)),
    )
}

/// Binds `config.listen_addr` and serves until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(config: Arc<Config>, topology: Arc<Topology>, orchestrator: Arc<Orchestrator>) -> Result<()> {
    let listen_addr = config.listen_addr.clone();
    let app = router(config, topology, orchestrator);

    let listener = TcpListener::bind(&listen_addr).await?;
    info!(listen_addr, "listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown::shutdown_signal_handler())
        .await?;

    Ok(())
}
