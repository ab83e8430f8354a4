//! The only component permitted to issue mutating exec calls or to modify
//! topology state. Owns the `OperationLock` and runs the promote/demote-all
//! workflows; registry mutations (`add_host`/`delete_host`) take the same
//! lock since the source treats them as part of the same serialization
//! domain as failover.

mod lock;
mod promote;

use crate::config::{Credentials, NodeKind, NodeSpec};
use crate::driver::NodeDriver;
use crate::error::OrchestratorError;
use crate::probe::Probe;
use crate::topology::{Node, Role, Topology};
use promote::{PromoteCtx, PromoteMachine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub use lock::{LockHolder, OperationLock};
pub use promote::PromoteOutcome;

pub struct DemoteOutcome {
    pub demoted: Vec<String>,
    pub failures: Vec<(String, String)>,
}

/// Builds a `Probe` over a borrowed driver/credentials pair, shared by
/// `Orchestrator::probe_of` and `demote_all`'s detached task (which owns its
/// driver handle and credentials rather than borrowing `&Orchestrator`).
fn probe_for<'a>(driver: &'a dyn NodeDriver, credentials: &'a Credentials, node: &Node, deadline: Duration) -> Probe<'a> {
    Probe::new(
        driver,
        crate::driver::SqlTarget {
            node: node.name.clone(),
            host: node.host.clone(),
            port: node.port,
        },
        credentials,
        deadline,
    )
}

pub struct Orchestrator {
    topology: Arc<Topology>,
    driver: Arc<dyn NodeDriver>,
    credentials: Credentials,
    lock: OperationLock,
    promote_deadline: Duration,
    demote_deadline: Duration,
    probe_deadline: Duration,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        topology: Arc<Topology>,
        driver: Arc<dyn NodeDriver>,
        credentials: Credentials,
        promote_deadline: Duration,
        demote_deadline: Duration,
        probe_deadline: Duration,
    ) -> Self {
        Self {
            topology,
            driver,
            credentials,
            lock: OperationLock::new(),
            promote_deadline,
            demote_deadline,
            probe_deadline,
        }
    }

    fn probe_of<'a>(&'a self, node: &Node) -> Probe<'a> {
        probe_for(self.driver.as_ref(), &self.credentials, node, self.probe_deadline)
    }

    /// Promotes `target` to primary. Preconditions are checked before the
    /// lock is even acquired where possible, and the lag gate — the
    /// system's central safety invariant — is checked immediately after.
    pub async fn promote(&self, target_name: &str) -> Result<PromoteOutcome, OrchestratorError> {
        let guard = self.lock.try_acquire("promote", self.promote_deadline)?;

        let target = self
            .topology
            .get(target_name)
            .await
            .ok_or_else(|| OrchestratorError::InvalidTarget(target_name.to_string()))?;
        if target.kind != NodeKind::Backup {
            return Err(OrchestratorError::InvalidTarget(target_name.to_string()));
        }

        let target_probe = self.probe_of(&target);
        if !target_probe.is_ready().await {
            return Err(OrchestratorError::Unreachable(
                target_name.to_string(),
                "target not reachable over SQL".to_string(),
            ));
        }

        if target_probe
            .is_primary()
            .await
            .map_err(|e| OrchestratorError::Unreachable(target_name.to_string(), e.to_string()))?
        {
            // Already primary: idempotent success, no mutation needed.
            drop(guard);
            return Ok(PromoteOutcome {
                message: format!("{target_name} is already primary"),
                new_primary: target_name.to_string(),
                degraded: Vec::new(),
            });
        }

        let all = self.topology.snapshot().await;
        let mut primary = None;
        for node in &all {
            if node.name == target.name {
                continue;
            }
            let probe = self.probe_of(node);
            if matches!(probe.is_primary().await, Ok(true)) {
                primary = Some(node.clone());
                break;
            }
        }

        if let Some(primary_node) = &primary {
            let primary_probe = self.probe_of(primary_node);
            let primary_lsn = primary_probe
                .current_lsn()
                .await
                .map_err(|e| OrchestratorError::Unreachable(primary_node.name.clone(), e.to_string()))?;
            let target_receive_lsn = target_probe
                .receive_lsn()
                .await
                .map_err(|e| OrchestratorError::Unreachable(target_name.to_string(), e.to_string()))?;
            let gap_bytes = primary_probe
                .lsn_diff(&primary_lsn, &target_receive_lsn)
                .await
                .map_err(|e| OrchestratorError::Unreachable(primary_node.name.clone(), e.to_string()))?;

            if gap_bytes > 0 {
                return Err(OrchestratorError::LagTooHigh { gap_bytes });
            }
        } else {
            info!(target = %target_name, "no current primary, forced promotion");
        }

        let others: Vec<Node> = all.into_iter().filter(|n| n.name != target.name).collect();
        let ctx = PromoteCtx {
            target: target.clone(),
            primary,
            others,
            degraded: Vec::new(),
            observed_roles: HashMap::new(),
        };
        let machine = PromoteMachine {
            driver: self.driver.clone(),
            credentials: self.credentials.clone(),
            step_deadline: self.probe_deadline.max(Duration::from_secs(15)),
        };
        let topology = self.topology.clone();
        let target_name = target_name.to_string();

        // The step machine runs to completion in its own task regardless of
        // whether the caller is still waiting: `timeout` below only bounds
        // how long this call waits on the `JoinHandle`, it never aborts the
        // task. The lock guard moves into the task and is held — and the
        // BUSY state it implies stays in effect — until Finalize actually
        // runs, preserving the total ordering of Topology mutations.
        let handle = tokio::spawn(async move {
            let outcome = promote::run(&machine, topology.as_ref(), ctx).await;
            drop(guard);
            outcome
        });

        match tokio::time::timeout(self.promote_deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(OrchestratorError::Internal(format!(
                "promote task for {target_name} panicked: {join_err}"
            ))),
            Err(_) => {
                warn!(target = %target_name, "promote exceeded its deadline; step machine keeps running detached, /status remains authoritative");
                Err(OrchestratorError::Deadline)
            }
        }
    }

    /// Drives every reachable backup back to standby. Replicas are already
    /// pinned and are a no-op.
    pub async fn demote_all(&self) -> Result<DemoteOutcome, OrchestratorError> {
        let guard = self.lock.try_acquire("demote_all", self.demote_deadline)?;

        let nodes = self.topology.snapshot().await;
        let backups: Vec<Node> = nodes.into_iter().filter(|n| n.kind == NodeKind::Backup).collect();

        let driver = self.driver.clone();
        let credentials = self.credentials.clone();
        let topology = self.topology.clone();
        let probe_deadline = self.probe_deadline;

        // As in `promote`, the loop below runs to completion in its own
        // task: `timeout` only bounds how long this call waits on the
        // `JoinHandle`. The lock guard moves into the task and is released
        // only once Finalize has actually run.
        let handle = tokio::spawn(async move {
            let mut demoted = Vec::new();
            let mut failures = Vec::new();
            let mut observed_roles = HashMap::new();

            for node in &backups {
                let probe = probe_for(driver.as_ref(), &credentials, node, probe_deadline);
                if !probe.is_ready().await {
                    failures.push((node.name.clone(), "unreachable".to_string()));
                    continue;
                }

                if driver
                    .exec(&node.container, &["touch", "$PGDATA/standby.signal"], probe_deadline)
                    .await
                    .is_err()
                {
                    failures.push((node.name.clone(), "failed to touch standby.signal".to_string()));
                    continue;
                }
                if driver
                    .exec(&node.container, &["pg_ctl", "restart", "-D", "$PGDATA"], probe_deadline)
                    .await
                    .is_err()
                {
                    failures.push((node.name.clone(), "failed to restart".to_string()));
                    continue;
                }

                let budget = tokio::time::Instant::now() + Duration::from_secs(30);
                let mut became_standby = false;
                loop {
                    if matches!(probe.is_primary().await, Ok(false)) {
                        became_standby = true;
                        break;
                    }
                    if tokio::time::Instant::now() >= budget {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }

                if became_standby {
                    demoted.push(node.name.clone());
                    observed_roles.insert(node.name.clone(), Role::Standby);
                } else {
                    failures.push((node.name.clone(), "did not converge to standby within budget".to_string()));
                    observed_roles.insert(node.name.clone(), Role::Unknown);
                }
            }

            topology.finalize("", &observed_roles).await;
            drop(guard);
            DemoteOutcome { demoted, failures }
        });

        match tokio::time::timeout(self.demote_deadline, handle).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(join_err)) => Err(OrchestratorError::Internal(format!(
                "demote-all task panicked: {join_err}"
            ))),
            Err(_) => {
                warn!("demote-all exceeded its deadline; step machine keeps running detached, /status remains authoritative");
                Err(OrchestratorError::Deadline)
            }
        }
    }

    pub async fn add_host(&self, spec: NodeSpec) -> Result<(), OrchestratorError> {
        let _guard = self.lock.try_acquire("add_host", Duration::from_secs(5))?;
        self.topology
            .insert(Node {
                name: spec.name,
                container: spec.container,
                host: spec.host,
                port: spec.port,
                kind: spec.kind,
                role_hint: Role::Unknown,
                last_probe: None,
            })
            .await
    }

    pub async fn delete_host(&self, identifier: &str) -> Result<Node, OrchestratorError> {
        let _guard = self.lock.try_acquire("delete_host", Duration::from_secs(5))?;

        let candidate = match self.topology.get(identifier).await {
            Some(n) => n,
            None => self
                .topology
                .snapshot()
                .await
                .into_iter()
                .find(|n| n.matches_identifier(identifier))
                .ok_or_else(|| OrchestratorError::NotFound(identifier.to_string()))?,
        };

        let probe = self.probe_of(&candidate);
        if matches!(probe.is_primary().await, Ok(true)) {
            return Err(OrchestratorError::IsPrimary(candidate.name.clone()));
        }

        self.topology.remove(&candidate.name).await
    }
}
