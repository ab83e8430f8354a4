//! Typed error taxonomy for the control plane.
//!
//! Lower layers (`driver`, `probe`) raise narrow error types; `OrchestratorError`
//! classifies those into the operational vocabulary of the step machine; `ApiError`
//! is the only error type the HTTP layer ever returns, and owns the JSON envelope
//! and status code mapping described by the spec's error taxonomy.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

/// Errors raised by `NodeDriver::exec`.
#[derive(thiserror::Error, Debug, Clone)]
pub enum DriverError {
    #[error("container {container} is unreachable: {reason}")]
    Unreachable { container: String, reason: String },

    #[error("operation against {container} exceeded its deadline")]
    Deadline { container: String },
}

/// Errors raised by `NodeDriver::sql`, classified from the underlying `sqlx::Error`.
#[derive(thiserror::Error, Debug, Clone)]
pub enum SqlError {
    #[error("connection to {node} refused")]
    ConnRefused { node: String },

    #[error("authentication failed for {node}")]
    AuthFailed { node: String },

    #[error("{node} rejected a write while in recovery")]
    ReadOnly { node: String },

    #[error("query against {node} timed out")]
    Timeout { node: String },

    #[error("{node} returned an unexpected error {code}: {message}")]
    Other {
        node: String,
        code: String,
        message: String,
    },
}

impl SqlError {
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::ConnRefused { node }
            | Self::AuthFailed { node }
            | Self::ReadOnly { node }
            | Self::Timeout { node }
            | Self::Other { node, .. } => node,
        }
    }
}

/// Errors raised inside the orchestrator's step machine, before classification
/// into the HTTP-facing `ApiError`.
#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    #[error("node {0} is not a known target")]
    InvalidTarget(String),

    #[error("node {0} is unreachable: {1}")]
    Unreachable(String, String),

    #[error("promotion refused, target lags primary by {gap_bytes} bytes")]
    LagTooHigh { gap_bytes: i64 },

    #[error("another operation is in progress: {0}")]
    Busy(String),

    #[error("promotion did not complete verification: {0}")]
    PromoteFailed(String),

    #[error("node {0} is already registered")]
    Duplicate(String),

    #[error("node {0} is not registered")]
    NotFound(String),

    #[error("node {0} is the current primary and cannot be removed")]
    IsPrimary(String),

    #[error("operation exceeded its global deadline")]
    Deadline,

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl From<DriverError> for OrchestratorError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Unreachable { container, reason } => {
                Self::Unreachable(container, reason)
            }
            DriverError::Deadline { container } => {
                Self::Unreachable(container, "deadline exceeded".to_string())
            }
        }
    }
}

impl From<SqlError> for OrchestratorError {
    fn from(err: SqlError) -> Self {
        let node = err.node().to_string();
        Self::Unreachable(node, err.to_string())
    }
}

/// A node that failed to reconfigure during `promote`'s standby rewind step;
/// reported back as a warning rather than failing the whole operation.
#[derive(Debug, Clone, Serialize)]
pub struct ReconfigWarning {
    pub node: String,
    pub reason: String,
}

/// The error taxonomy exposed over HTTP. Every axum handler in `api` returns
/// `Result<_, ApiError>`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidTarget(String),

    #[error("{0}")]
    Unreachable(String),

    #[error("promotion refused, target lags primary by {gap_bytes} bytes")]
    LagTooHigh { gap_bytes: i64 },

    #[error("{0}")]
    Busy(String),

    #[error("{0}")]
    PromoteFailed(String),

    #[error("reconfiguration partially completed")]
    ReconfigPartial { warnings: Vec<ReconfigWarning> },

    #[error("operation exceeded its global deadline")]
    Deadline,

    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("demote-all failed for {failed} of {total} node(s)")]
    DemoteFailed {
        failed: usize,
        total: usize,
        failures: Vec<ReconfigWarning>,
    },

    #[error("internal error")]
    Internal { details: Value },
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidTarget(n) => {
                Self::InvalidTarget(format!("unknown or non-promotable target: {n}"))
            }
            OrchestratorError::Unreachable(n, reason) => {
                Self::Unreachable(format!("node {n} unreachable: {reason}"))
            }
            OrchestratorError::LagTooHigh { gap_bytes } => Self::LagTooHigh { gap_bytes },
            OrchestratorError::Busy(holder) => {
                Self::Busy(format!("operation lock held by {holder}"))
            }
            OrchestratorError::PromoteFailed(reason) => Self::PromoteFailed(reason),
            OrchestratorError::Duplicate(n) => Self::Duplicate(format!("node {n} already exists")),
            OrchestratorError::NotFound(n) => Self::NotFound(format!("node {n} not found")),
            OrchestratorError::IsPrimary(n) => {
                Self::InvalidRequest(format!("node {n} is the current primary"))
            }
            OrchestratorError::Deadline => Self::Deadline,
            OrchestratorError::Internal(msg) => Self::Internal {
                details: json!({ "conflict": msg }),
            },
        }
    }
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::Unreachable(_) => "UNREACHABLE",
            Self::LagTooHigh { .. } => "LAG_TOO_HIGH",
            Self::Busy(_) => "BUSY",
            Self::PromoteFailed(_) => "PROMOTE_FAILED",
            Self::ReconfigPartial { .. } => "RECONFIG_PARTIAL",
            Self::Deadline => "DEADLINE",
            Self::Duplicate(_) => "DUPLICATE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::DemoteFailed { .. } => "DEMOTE_FAILED",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidTarget(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unreachable(_) => StatusCode::BAD_GATEWAY,
            Self::LagTooHigh { .. } | Self::Busy(_) | Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::PromoteFailed(_) | Self::DemoteFailed { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            // ReconfigPartial is reported with a 200 body carrying warnings; it never
            // reaches IntoResponse as a top-level error (see api::promote).
            Self::ReconfigPartial { .. } => StatusCode::OK,
            Self::Deadline => StatusCode::GATEWAY_TIMEOUT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn details(&self) -> Value {
        match self {
            Self::LagTooHigh { gap_bytes } => json!({ "gap_bytes": gap_bytes }),
            Self::ReconfigPartial { warnings } => json!({ "warnings": warnings }),
            Self::DemoteFailed { failures, .. } => json!({ "failures": failures }),
            Self::Internal { details } => details.clone(),
            _ => Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
            "details": self.details(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_too_high_carries_gap_bytes_in_details() {
        let err = ApiError::LagTooHigh { gap_bytes: 42 };
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "LAG_TOO_HIGH");
        assert_eq!(err.details(), json!({ "gap_bytes": 42 }));
    }

    #[test]
    fn busy_maps_to_409() {
        let err = ApiError::Busy("promote#3".to_string());
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "BUSY");
    }

    #[test]
    fn invalid_target_maps_to_400() {
        let err = ApiError::InvalidTarget("r3 is a replica".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "INVALID_TARGET");
    }

    #[test]
    fn unreachable_maps_to_502() {
        let err = ApiError::Unreachable("node3 unreachable".to_string());
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.kind(), "UNREACHABLE");
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::NotFound("r9 not found".to_string());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[test]
    fn orchestrator_is_primary_becomes_invalid_request_400() {
        let err: ApiError = OrchestratorError::IsPrimary("node1".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "INVALID_REQUEST");
    }

    #[test]
    fn deadline_maps_to_504() {
        let err: ApiError = OrchestratorError::Deadline.into();
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.kind(), "DEADLINE");
    }
}
