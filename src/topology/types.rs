//! The registry record and the public documents built from it.

use crate::config::NodeKind;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Last-observed role of a node. Advisory only — the authoritative source of
/// truth is always the next probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    #[serde(rename = "PRIMARY")]
    Primary,
    #[serde(rename = "STANDBY")]
    Standby,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// A member of the cluster, as held in the registry.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub container: String,
    pub host: String,
    pub port: u16,
    pub kind: NodeKind,
    pub role_hint: Role,
    pub last_probe: Option<DateTime<Utc>>,
}

impl Node {
    #[must_use]
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.name == identifier || self.host == identifier
    }
}

/// Cluster-wide verdict. An internal 5th bookkeeping state (mid-transition)
/// is never serialized; every public read collapses to one of these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClusterStatus {
    #[serde(rename = "HEALTHY")]
    Healthy,
    #[serde(rename = "NO_PRIMARY")]
    NoPrimary,
    #[serde(rename = "SPLIT_BRAIN")]
    SplitBrain,
    #[serde(rename = "DEGRADED")]
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusNode {
    pub is_primary: bool,
    pub container: String,
    pub port: u16,
    pub connected: bool,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub nodes: std::collections::HashMap<String, StatusNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicationGap {
    pub gap_bytes: i64,
    pub primary_lsn: String,
    pub receive_lsn: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewNode {
    pub is_primary: bool,
    pub container: String,
    pub port: u16,
    pub connected: bool,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_gap: Option<ReplicationGap>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub nodes: std::collections::HashMap<String, OverviewNode>,
    pub primary_node: Option<String>,
    pub cluster_status: ClusterStatus,
}
