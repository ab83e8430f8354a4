//! In-memory cluster registry plus the probing logic that turns it into the
//! public `Status`/`Overview` documents. Mutated only by the orchestrator,
//! under its lock; reads never take more than a read guard and never hold it
//! across a probe.

pub mod types;

use crate::config::{Credentials, NodeSpec};
use crate::driver::{NodeDriver, SqlTarget};
use crate::error::OrchestratorError;
use crate::probe::Probe;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
pub use types::{ClusterStatus, Node, Overview, OverviewNode, ReplicationGap, Role, Status, StatusNode};

/// Outcome of probing a single node once, independent of its role in the
/// resulting document — shared by `status()` and `overview()`.
struct NodeSample {
    connected: bool,
    is_primary: bool,
    current_lsn: Option<String>,
    receive_lsn: Option<String>,
}

pub struct Topology {
    nodes: RwLock<HashMap<String, Node>>,
    driver: Arc<dyn NodeDriver>,
    credentials: Credentials,
    probe_deadline: Duration,
}

impl Topology {
    #[must_use]
    pub fn new(
        initial_nodes: Vec<NodeSpec>,
        driver: Arc<dyn NodeDriver>,
        credentials: Credentials,
        probe_deadline: Duration,
    ) -> Self {
        let mut nodes = HashMap::with_capacity(initial_nodes.len());
        for spec in initial_nodes {
            nodes.insert(
                spec.name.clone(),
                Node {
                    name: spec.name,
                    container: spec.container,
                    host: spec.host,
                    port: spec.port,
                    kind: spec.kind,
                    role_hint: Role::Unknown,
                    last_probe: None,
                },
            );
        }
        Self {
            nodes: RwLock::new(nodes),
            driver,
            credentials,
            probe_deadline,
        }
    }

    /// Clones the current node set under a read guard held only for the
    /// duration of the clone — never across a probe.
    pub async fn snapshot(&self) -> Vec<Node> {
        self.nodes.read().await.values().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<Node> {
        self.nodes.read().await.get(name).cloned()
    }

    pub async fn insert(&self, node: Node) -> Result<(), OrchestratorError> {
        let mut guard = self.nodes.write().await;
        if guard.contains_key(&node.name) {
            return Err(OrchestratorError::Duplicate(node.name));
        }
        if guard
            .values()
            .any(|existing| existing.host == node.host && existing.port == node.port)
        {
            return Err(OrchestratorError::Duplicate(format!(
                "{}:{}",
                node.host, node.port
            )));
        }
        guard.insert(node.name.clone(), node);
        Ok(())
    }

    pub async fn remove(&self, identifier: &str) -> Result<Node, OrchestratorError> {
        let mut guard = self.nodes.write().await;
        let name = guard
            .values()
            .find(|n| n.matches_identifier(identifier))
            .map(|n| n.name.clone())
            .ok_or_else(|| OrchestratorError::NotFound(identifier.to_string()))?;
        guard
            .remove(&name)
            .ok_or_else(|| OrchestratorError::NotFound(identifier.to_string()))
    }

    /// Applies the Finalize step of a promote or demote-all: the new
    /// primary (if any) and every *observed* node's role become visible
    /// atomically. Nodes absent from `observed_roles` and not named by
    /// `primary` keep their prior hint untouched.
    pub async fn finalize(&self, primary: &str, observed_roles: &HashMap<String, Role>) {
        let mut guard = self.nodes.write().await;
        if let Some(node) = guard.get_mut(primary) {
            node.role_hint = Role::Primary;
            node.last_probe = Some(Utc::now());
        }
        for (name, role) in observed_roles {
            if name == primary {
                continue;
            }
            if let Some(node) = guard.get_mut(name) {
                node.role_hint = *role;
                node.last_probe = Some(Utc::now());
            }
        }
    }

    fn target_for(node: &Node) -> SqlTarget {
        SqlTarget {
            node: node.name.clone(),
            host: node.host.clone(),
            port: node.port,
        }
    }

    fn probe_for<'a>(&'a self, node: &Node) -> Probe<'a> {
        Probe::new(
            self.driver.as_ref(),
            Self::target_for(node),
            &self.credentials,
            self.probe_deadline,
        )
    }

    async fn sample(&self, node: &Node, want_lsns: bool) -> NodeSample {
        let probe = self.probe_for(node);
        match probe.is_primary().await {
            Ok(is_primary) => {
                let (current_lsn, receive_lsn) = if want_lsns {
                    if is_primary {
                        (probe.current_lsn().await.ok(), None)
                    } else {
                        (None, probe.receive_lsn().await.ok())
                    }
                } else {
                    (None, None)
                };
                NodeSample {
                    connected: true,
                    is_primary,
                    current_lsn,
                    receive_lsn,
                }
            }
            Err(_) => NodeSample {
                connected: false,
                is_primary: false,
                current_lsn: None,
                receive_lsn: None,
            },
        }
    }

    fn role_of(sample: &NodeSample) -> Role {
        if !sample.connected {
            Role::Unknown
        } else if sample.is_primary {
            Role::Primary
        } else {
            Role::Standby
        }
    }

    /// `GET /status` — topology snapshot, no lag computation.
    pub async fn status(&self) -> Status {
        let nodes = self.snapshot().await;
        let samples = join_all(nodes.iter().map(|n| self.sample(n, false))).await;

        let mut out = HashMap::with_capacity(nodes.len());
        for (node, sample) in nodes.iter().zip(samples.iter()) {
            out.insert(
                node.name.clone(),
                StatusNode {
                    is_primary: sample.is_primary,
                    container: node.container.clone(),
                    port: node.port,
                    connected: sample.connected,
                    role: Self::role_of(sample),
                },
            );
        }
        Status { nodes: out }
    }

    /// `GET /overview` — `status()` enriched with per-standby replication
    /// gap and the cluster-level verdict.
    pub async fn overview(&self, healthy_lag_bytes: i64) -> Overview {
        let nodes = self.snapshot().await;
        let samples = join_all(nodes.iter().map(|n| self.sample(n, true))).await;

        let primaries: Vec<(&Node, &NodeSample)> = nodes
            .iter()
            .zip(samples.iter())
            .filter(|(_, s)| s.connected && s.is_primary)
            .collect();

        let primary = primaries.first().copied();
        let primary_lsn = primary.and_then(|(_, s)| s.current_lsn.clone());

        let mut gaps: HashMap<String, ReplicationGap> = HashMap::new();
        if let (Some((primary_node, _)), Some(primary_lsn)) = (primary, primary_lsn.as_ref()) {
            let primary_probe = self.probe_for(primary_node);
            for (node, sample) in nodes.iter().zip(samples.iter()) {
                if sample.connected && !sample.is_primary {
                    if let Some(receive_lsn) = &sample.receive_lsn {
                        if let Ok(gap_bytes) = primary_probe.lsn_diff(primary_lsn, receive_lsn).await {
                            gaps.insert(
                                node.name.clone(),
                                ReplicationGap {
                                    gap_bytes,
                                    primary_lsn: primary_lsn.clone(),
                                    receive_lsn: receive_lsn.clone(),
                                },
                            );
                        }
                    }
                }
            }
        }

        let mut out = HashMap::with_capacity(nodes.len());
        let mut standby_unreachable = false;
        let mut standby_over_lag = false;

        for (node, sample) in nodes.iter().zip(samples.iter()) {
            let role = Self::role_of(sample);
            let gap = gaps.get(&node.name).cloned();

            if role != Role::Primary {
                match &gap {
                    Some(g) if g.gap_bytes > healthy_lag_bytes => standby_over_lag = true,
                    None if !sample.connected => standby_unreachable = true,
                    _ => {}
                }
            }

            out.insert(
                node.name.clone(),
                OverviewNode {
                    is_primary: sample.is_primary,
                    container: node.container.clone(),
                    port: node.port,
                    connected: sample.connected,
                    role,
                    replication_gap: gap,
                },
            );
        }

        let cluster_status = match primaries.len() {
            0 => ClusterStatus::NoPrimary,
            1 if standby_unreachable || standby_over_lag => ClusterStatus::Degraded,
            1 => ClusterStatus::Healthy,
            _ => ClusterStatus::SplitBrain,
        };

        Overview {
            nodes: out,
            primary_node: primary.map(|(n, _)| n.name.clone()),
            cluster_status,
        }
    }
}
