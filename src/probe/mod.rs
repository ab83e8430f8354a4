//! Typed SQL probes over a `NodeDriver`. Each probe issues exactly one
//! statement and decodes the result into a structured value — never a raw
//! string, never a parsed LSN (LSN arithmetic always happens via
//! `pg_wal_lsn_diff` on a live session, per the lag-gate invariant).

pub mod types;

use crate::config::Credentials;
use crate::driver::{NodeDriver, SqlRow, SqlTarget};
use crate::error::SqlError;
use std::time::Duration;
use tracing::{debug, instrument};
pub use types::{ReplicationPeer, ReplicationSlot};

/// Borrows a `NodeDriver` and a node's connection details long enough to run
/// one or more typed queries against it.
pub struct Probe<'a> {
    driver: &'a dyn NodeDriver,
    target: SqlTarget,
    credentials: &'a Credentials,
    deadline: Duration,
}

impl<'a> Probe<'a> {
    #[must_use]
    pub fn new(
        driver: &'a dyn NodeDriver,
        target: SqlTarget,
        credentials: &'a Credentials,
        deadline: Duration,
    ) -> Self {
        Self {
            driver,
            target,
            credentials,
            deadline,
        }
    }

    #[must_use]
    pub fn node(&self) -> &str {
        &self.target.node
    }

    async fn query(&self, statement: &str) -> Result<Vec<SqlRow>, SqlError> {
        self.driver
            .sql(&self.target, self.credentials, statement, self.deadline)
            .await
    }

    fn first_row(&self, rows: Vec<SqlRow>) -> Result<SqlRow, SqlError> {
        rows.into_iter().next().ok_or_else(|| SqlError::Other {
            node: self.target.node.clone(),
            code: "NO_ROWS".to_string(),
            message: "expected exactly one row".to_string(),
        })
    }

    /// `select pg_is_in_recovery()`. A node is the primary iff this is `false`.
    #[instrument(skip(self), fields(node = %self.node()))]
    pub async fn is_primary(&self) -> Result<bool, SqlError> {
        let rows = self.query("select pg_is_in_recovery() as in_recovery").await?;
        let row = self.first_row(rows)?;
        let in_recovery = row.bool("in_recovery").unwrap_or(true);
        Ok(!in_recovery)
    }

    /// `select pg_current_wal_lsn()`. Only meaningful on a primary.
    #[instrument(skip(self), fields(node = %self.node()))]
    pub async fn current_lsn(&self) -> Result<String, SqlError> {
        let rows = self.query("select pg_current_wal_lsn()::text as lsn").await?;
        let row = self.first_row(rows)?;
        row.text("lsn").ok_or_else(|| SqlError::Other {
            node: self.target.node.clone(),
            code: "NO_LSN".to_string(),
            message: "pg_current_wal_lsn() returned no value".to_string(),
        })
    }

    /// `select pg_last_wal_receive_lsn()`. Only meaningful on a standby.
    #[instrument(skip(self), fields(node = %self.node()))]
    pub async fn receive_lsn(&self) -> Result<String, SqlError> {
        let rows = self
            .query("select pg_last_wal_receive_lsn()::text as lsn")
            .await?;
        let row = self.first_row(rows)?;
        row.text("lsn").ok_or_else(|| SqlError::Other {
            node: self.target.node.clone(),
            code: "NO_LSN".to_string(),
            message: "pg_last_wal_receive_lsn() returned no value".to_string(),
        })
    }

    /// `select pg_last_wal_replay_lsn()`. Only meaningful on a standby.
    #[instrument(skip(self), fields(node = %self.node()))]
    pub async fn replay_lsn(&self) -> Result<String, SqlError> {
        let rows = self
            .query("select pg_last_wal_replay_lsn()::text as lsn")
            .await?;
        let row = self.first_row(rows)?;
        row.text("lsn").ok_or_else(|| SqlError::Other {
            node: self.target.node.clone(),
            code: "NO_LSN".to_string(),
            message: "pg_last_wal_replay_lsn() returned no value".to_string(),
        })
    }

    /// `select pg_wal_lsn_diff(a, b)`, issued on a live primary. The only
    /// place in this codebase that compares two LSNs; the result is a
    /// plain signed byte count, never a parsed LSN.
    #[instrument(skip(self), fields(node = %self.node()))]
    pub async fn lsn_diff(&self, a: &str, b: &str) -> Result<i64, SqlError> {
        let statement = format!("select pg_wal_lsn_diff('{a}', '{b}') as gap");
        let rows = self.query(&statement).await?;
        let row = self.first_row(rows)?;
        row.int("gap").ok_or_else(|| SqlError::Other {
            node: self.target.node.clone(),
            code: "NO_GAP".to_string(),
            message: "pg_wal_lsn_diff returned no value".to_string(),
        })
    }

    #[instrument(skip(self), fields(node = %self.node()))]
    pub async fn replication(&self) -> Result<Vec<ReplicationPeer>, SqlError> {
        let rows = self
            .query(
                "select \
                    COALESCE(client_addr::text, '') as client_addr, \
                    state, \
                    sync_state, \
                    EXTRACT(EPOCH FROM write_lag) as write_lag, \
                    EXTRACT(EPOCH FROM flush_lag) as flush_lag, \
                    EXTRACT(EPOCH FROM replay_lag) as replay_lag \
                 from pg_stat_replication",
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ReplicationPeer {
                client_addr: row.text("client_addr").unwrap_or_default(),
                state: row.text("state").unwrap_or_default(),
                sync_state: row.text("sync_state").unwrap_or_default(),
                write_lag_seconds: row.float("write_lag"),
                flush_lag_seconds: row.float("flush_lag"),
                replay_lag_seconds: row.float("replay_lag"),
            })
            .collect())
    }

    #[instrument(skip(self), fields(node = %self.node()))]
    pub async fn slots(&self) -> Result<Vec<ReplicationSlot>, SqlError> {
        let rows = self
            .query(
                "select slot_name, active, COALESCE(restart_lsn::text, '') as restart_lsn \
                 from pg_replication_slots",
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ReplicationSlot {
                slot_name: row.text("slot_name").unwrap_or_default(),
                active: row.bool("active").unwrap_or(false),
                restart_lsn: row.text("restart_lsn").unwrap_or_default(),
            })
            .collect())
    }

    /// Lightweight reachability probe, backing `/health`-adjacent checks and
    /// mirroring the `pg_isready` exec command from the container-exec
    /// contract.
    #[instrument(skip(self), fields(node = %self.node()))]
    pub async fn is_ready(&self) -> bool {
        match self.query("select 1 as ready").await {
            Ok(_) => true,
            Err(err) => {
                debug!(node = %self.node(), error = %err, "node not ready");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ExecOutput, SqlValue};
    use crate::error::DriverError;
    use futures::future::BoxFuture;
    use secrecy::SecretString;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A `NodeDriver` whose `sql` responses are pre-scripted per-statement,
    /// used to exercise `Probe`'s decoding logic without a real database.
    struct ScriptedDriver {
        responses: Mutex<HashMap<String, Result<Vec<SqlRow>, SqlError>>>,
    }

    impl ScriptedDriver {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
            }
        }

        fn on(&self, needle: &str, rows: Vec<SqlRow>) {
            self.responses
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(needle.to_string(), Ok(rows));
        }
    }

    impl NodeDriver for ScriptedDriver {
        fn exec<'a>(
            &'a self,
            container: &'a str,
            _argv: &'a [&'a str],
            _deadline: Duration,
        ) -> BoxFuture<'a, Result<ExecOutput, DriverError>> {
            Box::pin(async move {
                Err(DriverError::Unreachable {
                    container: container.to_string(),
                    reason: "not implemented in ScriptedDriver".to_string(),
                })
            })
        }

        fn sql<'a>(
            &'a self,
            target: &'a SqlTarget,
            _credentials: &'a Credentials,
            statement: &'a str,
            _deadline: Duration,
        ) -> BoxFuture<'a, Result<Vec<SqlRow>, SqlError>> {
            let responses = self
                .responses
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let found = responses.iter().find(|(needle, _)| statement.contains(needle.as_str()));
            let result = match found {
                Some((_, Ok(rows))) => Ok(rows.clone()),
                Some((_, Err(e))) => Err(e.clone()),
                None => Err(SqlError::Other {
                    node: target.node.clone(),
                    code: "UNSCRIPTED".to_string(),
                    message: statement.to_string(),
                }),
            };
            Box::pin(async move { result })
        }
    }

    fn creds() -> Credentials {
        Credentials {
            user: "postgres".to_string(),
            password: SecretString::from("x"),
            database: "postgres".to_string(),
        }
    }

    fn row(fields: &[(&str, SqlValue)]) -> SqlRow {
        SqlRow(fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[tokio::test]
    async fn is_primary_false_when_in_recovery() {
        let driver = ScriptedDriver::new();
        driver.on(
            "pg_is_in_recovery",
            vec![row(&[("in_recovery", SqlValue::Bool(true))])],
        );
        let creds = creds();
        let target = SqlTarget {
            node: "node1".to_string(),
            host: "h".to_string(),
            port: 5432,
        };
        let probe = Probe::new(&driver, target, &creds, Duration::from_secs(5));

        assert!(!probe.is_primary().await.unwrap());
    }

    #[tokio::test]
    async fn is_primary_true_when_not_in_recovery() {
        let driver = ScriptedDriver::new();
        driver.on(
            "pg_is_in_recovery",
            vec![row(&[("in_recovery", SqlValue::Bool(false))])],
        );
        let creds = creds();
        let target = SqlTarget {
            node: "node1".to_string(),
            host: "h".to_string(),
            port: 5432,
        };
        let probe = Probe::new(&driver, target, &creds, Duration::from_secs(5));

        assert!(probe.is_primary().await.unwrap());
    }

    #[tokio::test]
    async fn lsn_diff_returns_signed_gap() {
        let driver = ScriptedDriver::new();
        driver.on("pg_wal_lsn_diff", vec![row(&[("gap", SqlValue::Int(-5))])]);
        let creds = creds();
        let target = SqlTarget {
            node: "node1".to_string(),
            host: "h".to_string(),
            port: 5432,
        };
        let probe = Probe::new(&driver, target, &creds, Duration::from_secs(5));

        assert_eq!(probe.lsn_diff("0/1", "0/2").await.unwrap(), -5);
    }

    #[tokio::test]
    async fn is_ready_false_on_error() {
        let driver = ScriptedDriver::new();
        let creds = creds();
        let target = SqlTarget {
            node: "node1".to_string(),
            host: "h".to_string(),
            port: 5432,
        };
        let probe = Probe::new(&driver, target, &creds, Duration::from_secs(5));

        assert!(!probe.is_ready().await);
    }
}
