//! Handlers translating HTTP requests into `Topology`/`Orchestrator` calls.
//! Every mutating handler returns `Result<_, ApiError>` so `?` does the
//! classification from `OrchestratorError` automatically.

use super::dto::{
    AddHostRequest, AddHostResponse, DeleteHostResponse, DemoteAllResponse, HealthResponse,
    PromoteResponse,
};
use crate::config::{Config, NodeKind, NodeSpec};
use crate::error::ApiError;
use crate::orchestrator::Orchestrator;
use crate::topology::{Node, Overview, Status, Topology};
use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: crate::built_info::GIT_COMMIT_HASH.map(str::to_string),
    })
}

#[instrument(skip(topology))]
pub async fn status(Extension(topology): Extension<Arc<Topology>>) -> Json<Status> {
    Json(topology.status().await)
}

#[instrument(skip(topology, config))]
pub async fn overview(
    Extension(topology): Extension<Arc<Topology>>,
    Extension(config): Extension<Arc<Config>>,
) -> Json<Overview> {
    Json(topology.overview(config.healthy_lag_bytes).await)
}

#[instrument(skip(orchestrator))]
pub async fn promote(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(node): Path<String>,
) -> Result<Json<PromoteResponse>, ApiError> {
    let outcome = orchestrator.promote(&node).await?;
    let warnings = if outcome.degraded.is_empty() {
        None
    } else {
        Some(
            outcome
                .degraded
                .iter()
                .map(|n| crate::error::ReconfigWarning {
                    node: n.clone(),
                    reason: "did not reconfigure within its budget".to_string(),
                })
                .collect(),
        )
    };

    Ok(Json(PromoteResponse {
        message: outcome.message,
        new_primary: outcome.new_primary,
        warnings,
    }))
}

#[instrument(skip(orchestrator))]
pub async fn demote_all(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
) -> Result<Json<DemoteAllResponse>, ApiError> {
    let outcome = orchestrator.demote_all().await?;

    if !outcome.failures.is_empty() {
        let failures: Vec<_> = outcome
            .failures
            .iter()
            .map(|(node, reason)| crate::error::ReconfigWarning {
                node: node.clone(),
                reason: reason.clone(),
            })
            .collect();
        return Err(ApiError::DemoteFailed {
            failed: failures.len(),
            total: outcome.demoted.len() + failures.len(),
            failures,
        });
    }

    Ok(Json(DemoteAllResponse {
        message: "demote-all completed".to_string(),
        demoted: outcome.demoted,
    }))
}

#[instrument(skip(orchestrator, body))]
pub async fn add_host(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Json(body): Json<AddHostRequest>,
) -> Result<(StatusCode, Json<AddHostResponse>), ApiError> {
    let kind = NodeKind::from_str(&body.kind)
        .map_err(|_| ApiError::InvalidRequest(format!("invalid kind: {}", body.kind)))?;
    let name = body.name.clone();
    orchestrator
        .add_host(NodeSpec {
            name: body.name,
            container: body.container,
            host: body.host,
            port: body.port,
            kind,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(AddHostResponse { host: name })))
}

#[instrument(skip(orchestrator))]
pub async fn delete_host(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(identifier): Path<String>,
) -> Result<Json<DeleteHostResponse>, ApiError> {
    let node: Node = orchestrator.delete_host(&identifier).await?;
    Ok(Json(DeleteHostResponse {
        deleted_host: node.name,
    }))
}
