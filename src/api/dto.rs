//! Request/response bodies for the HTTP surface. Internal types
//! (`topology::types`) are never serialized directly into a write-endpoint
//! response; each mutating handler builds its own small body here.

use crate::error::ReconfigWarning;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct AddHostRequest {
    pub name: String,
    pub container: String,
    pub host: String,
    pub port: u16,
    /// Validated in `handlers::add_host` rather than by `#[derive(Deserialize)]`
    /// on `NodeKind`, so an invalid value routes through `ApiError` (400
    /// `INVALID_REQUEST`) instead of axum's default `Json` rejection.
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddHostResponse {
    pub host: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteHostResponse {
    pub deleted_host: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromoteResponse {
    pub message: String,
    pub new_primary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<ReconfigWarning>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemoteAllResponse {
    pub message: String,
    pub demoted: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}
