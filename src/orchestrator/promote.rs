//! `promote(target)` encoded as an explicit step machine: each arm of
//! `PromoteStep` is one numbered step of the promotion workflow, driven by
//! `advance()` until it yields `None`. This replaces an informal retry loop
//! with an enum the caller can wrap in a single `timeout`.

use crate::driver::{NodeDriver, SqlTarget};
use crate::error::OrchestratorError;
use crate::probe::Probe;
use crate::topology::{Node, Role, Topology};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use super::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PromoteStep {
    Quiesce,
    ResumeReplay,
    RemoveSignal,
    Promote,
    Verify,
    Reconfigure,
    Finalize,
}

impl PromoteStep {
    pub(super) fn first() -> Self {
        PromoteStep::Quiesce
    }

    fn next(self) -> Option<Self> {
        use PromoteStep::{Finalize, Promote, Quiesce, Reconfigure, RemoveSignal, ResumeReplay, Verify};
        match self {
            Quiesce => Some(ResumeReplay),
            ResumeReplay => Some(RemoveSignal),
            RemoveSignal => Some(Promote),
            Promote => Some(Verify),
            Verify => Some(Reconfigure),
            Reconfigure => Some(Finalize),
            Finalize => None,
        }
    }
}

pub struct PromoteOutcome {
    pub message: String,
    pub new_primary: String,
    pub degraded: Vec<String>,
}

/// Mutable state threaded through the step machine.
pub(super) struct PromoteCtx {
    pub target: Node,
    pub primary: Option<Node>,
    pub others: Vec<Node>,
    pub degraded: Vec<String>,
    pub observed_roles: HashMap<String, Role>,
}

/// Owns its driver handle and credentials (rather than borrowing them) so a
/// machine can be moved into a detached `tokio::spawn`ed task and keep
/// running past the orchestrator's client-facing deadline.
pub(super) struct PromoteMachine {
    pub driver: Arc<dyn NodeDriver>,
    pub credentials: Credentials,
    pub step_deadline: Duration,
}

impl PromoteMachine {
    fn target_of(node: &Node) -> SqlTarget {
        SqlTarget {
            node: node.name.clone(),
            host: node.host.clone(),
            port: node.port,
        }
    }

    fn probe_of<'b>(&'b self, node: &Node) -> Probe<'b> {
        Probe::new(self.driver.as_ref(), Self::target_of(node), &self.credentials, self.step_deadline)
    }

    async fn exec(&self, node: &Node, argv: &[&str]) -> Result<(), OrchestratorError> {
        let output = self
            .driver
            .exec(&node.container, argv, self.step_deadline)
            .await?;
        if !output.success() {
            warn!(node = %node.name, argv = ?argv, exit = output.exit_code, "exec step returned non-zero");
        }
        Ok(())
    }

    /// Runs one step, returning the next step or `None` once Finalize ran.
    pub(super) async fn advance(
        &self,
        ctx: &mut PromoteCtx,
        step: PromoteStep,
    ) -> Result<Option<PromoteStep>, OrchestratorError> {
        match step {
            PromoteStep::Quiesce => {
                if let Some(primary) = ctx.primary.clone() {
                    let probe = self.probe_of(&primary);
                    // Best-effort: an unreachable primary simply skips quiescing.
                    let _ = self
                        .driver
                        .sql(
                            &Self::target_of(&primary),
                            &self.credentials,
                            "CHECKPOINT",
                            self.step_deadline,
                        )
                        .await;
                    drop(probe);
                }
                Ok(step.next())
            }

            PromoteStep::ResumeReplay => {
                let rows = self
                    .driver
                    .sql(
                        &Self::target_of(&ctx.target),
                        &self.credentials,
                        "select pg_wal_replay_resume()",
                        self.step_deadline,
                    )
                    .await;
                if let Err(err) = rows {
                    return Err(OrchestratorError::PromoteFailed(format!(
                        "resume replay on {}: {err}",
                        ctx.target.name
                    )));
                }
                Ok(step.next())
            }

            PromoteStep::RemoveSignal => {
                self.exec(&ctx.target, &["rm", "-f", "$PGDATA/standby.signal"])
                    .await?;
                Ok(step.next())
            }

            PromoteStep::Promote => {
                self.exec(&ctx.target, &["pg_ctl", "promote", "-D", "$PGDATA"])
                    .await?;
                Ok(step.next())
            }

            PromoteStep::Verify => {
                let probe = self.probe_of(&ctx.target);
                let budget = Duration::from_secs(30);
                let pacing = Duration::from_secs(2);
                let deadline = tokio::time::Instant::now() + budget;
                loop {
                    if matches!(probe.is_primary().await, Ok(true)) {
                        break;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(OrchestratorError::PromoteFailed(format!(
                            "{} did not become primary within the verify budget",
                            ctx.target.name
                        )));
                    }
                    sleep(pacing).await;
                }
                Ok(step.next())
            }

            PromoteStep::Reconfigure => {
                for standby in ctx.others.clone() {
                    let probe = self.probe_of(&standby);
                    if !probe.is_ready().await {
                        continue;
                    }

                    if self.exec(&standby, &["pg_ctl", "stop", "-m", "fast"]).await.is_err() {
                        ctx.degraded.push(standby.name.clone());
                        continue;
                    }
                    if self.exec(&standby, &["rm", "-rf", "$PGDATA"]).await.is_err() {
                        ctx.degraded.push(standby.name.clone());
                        continue;
                    }
                    if self
                        .exec(
                            &standby,
                            &[
                                "pg_basebackup",
                                "-h",
                                &ctx.target.host,
                                "-D",
                                "$PGDATA",
                                "-U",
                                "replicator",
                                "-R",
                            ],
                        )
                        .await
                        .is_err()
                    {
                        ctx.degraded.push(standby.name.clone());
                        continue;
                    }
                    if standby.kind == crate::config::NodeKind::Replica
                        && self.exec(&standby, &["touch", "$PGDATA/standby.signal"]).await.is_err()
                    {
                        ctx.degraded.push(standby.name.clone());
                        continue;
                    }
                    if self.exec(&standby, &["pg_ctl", "start", "-D", "$PGDATA"]).await.is_err() {
                        ctx.degraded.push(standby.name.clone());
                        continue;
                    }

                    let budget = Duration::from_secs(60);
                    let deadline = tokio::time::Instant::now() + budget;
                    let mut converged = false;
                    loop {
                        if matches!(probe.is_primary().await, Ok(false)) {
                            converged = true;
                            break;
                        }
                        if tokio::time::Instant::now() >= deadline {
                            break;
                        }
                        sleep(Duration::from_secs(2)).await;
                    }

                    if converged {
                        ctx.observed_roles.insert(standby.name.clone(), Role::Standby);
                    } else {
                        ctx.degraded.push(standby.name.clone());
                        ctx.observed_roles.insert(standby.name.clone(), Role::Unknown);
                        info!(node = %standby.name, "reconfigure did not converge within budget, marking degraded");
                    }
                }
                Ok(step.next())
            }

            PromoteStep::Finalize => {
                ctx.observed_roles.entry(ctx.target.name.clone()).or_insert(Role::Primary);
                for other in &ctx.others {
                    ctx.observed_roles
                        .entry(other.name.clone())
                        .or_insert(Role::Unknown);
                }
                Ok(None)
            }
        }
    }
}

pub(super) async fn run(
    machine: &PromoteMachine,
    topology: &Topology,
    mut ctx: PromoteCtx,
) -> Result<PromoteOutcome, OrchestratorError> {
    let target_name = ctx.target.name.clone();
    let mut step = PromoteStep::first();
    loop {
        match machine.advance(&mut ctx, step).await? {
            Some(next) => step = next,
            None => break,
        }
    }

    topology.finalize(&target_name, &ctx.observed_roles).await;

    Ok(PromoteOutcome {
        message: format!("{target_name} promoted to primary"),
        new_primary: target_name,
        degraded: ctx.degraded,
    })
}
