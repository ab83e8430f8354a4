#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]
#![allow(dead_code)]

use futures::future::BoxFuture;
use pg_opsd::config::Credentials;
use pg_opsd::driver::{ExecOutput, NodeDriver, SqlRow, SqlTarget, SqlValue};
use pg_opsd::error::{DriverError, SqlError};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// Find an available port for testing (returns port > 1024).
pub fn get_available_port() -> u16 {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind to random port");
    let port = listener
        .local_addr()
        .expect("failed to get local addr")
        .port();
    assert!(port > 1024, "assigned port {port} should be > 1024");
    port
}

/// Wait for a server to accept connections on the given port.
pub async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    use tokio::time::sleep;

    for attempt in 1..=max_attempts {
        if tokio::net::TcpStream::connect(format!("localhost:{port}"))
            .await
            .is_ok()
        {
            return true;
        }
        if attempt % 10 == 0 {
            eprintln!("still waiting for server on port {port} (attempt {attempt}/{max_attempts})");
        }
        sleep(Duration::from_millis(100)).await;
    }
    eprintln!("failed to connect to server on port {port} after {max_attempts} attempts");
    false
}

pub fn get_test_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

pub fn credentials() -> Credentials {
    Credentials {
        user: "postgres".to_string(),
        password: secrecy::SecretString::from("x"),
        database: "postgres".to_string(),
    }
}

/// An in-memory `NodeDriver` standing in for real containers and SQL
/// sessions. Primary status is tracked per node name and flipped by the
/// same exec calls the real promote/demote-all workflows issue
/// (`pg_ctl promote` flips a node to primary, `pg_ctl start`/`restart`
/// flips it back to standby), so the orchestrator's step machine drives
/// this fake exactly as it would a real cluster.
pub struct FakeNodeDriver {
    is_primary: Mutex<HashMap<String, bool>>,
    unreachable: Mutex<HashSet<String>>,
    gap_bytes: Mutex<i64>,
    exec_delay: Mutex<Duration>,
}

impl FakeNodeDriver {
    pub fn new() -> Self {
        Self {
            is_primary: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
            gap_bytes: Mutex::new(0),
            exec_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Makes every `exec` call take at least `delay` before returning,
    /// widening the window in which the operation lock is held — used to
    /// make concurrent-promote races deterministic in tests.
    pub fn set_exec_delay(&self, delay: Duration) {
        *self
            .exec_delay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = delay;
    }

    pub fn set_primary(&self, node: &str) {
        self.is_primary
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(node.to_string(), true);
    }

    pub fn set_unreachable(&self, node: &str) {
        self.unreachable
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(node.to_string());
    }

    pub fn set_gap_bytes(&self, gap: i64) {
        *self
            .gap_bytes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = gap;
    }

    fn is_node_primary(&self, node: &str) -> bool {
        self.is_primary
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(node)
            .copied()
            .unwrap_or(false)
    }
}

impl Default for FakeNodeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeDriver for FakeNodeDriver {
    fn exec<'a>(
        &'a self,
        container: &'a str,
        argv: &'a [&'a str],
        _deadline: Duration,
    ) -> BoxFuture<'a, Result<ExecOutput, DriverError>> {
        let node = container.to_string();
        if argv.contains(&"promote") {
            self.is_primary
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(node, true);
        } else if argv.contains(&"start") || argv.contains(&"restart") {
            self.is_primary
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(node, false);
        }
        let delay = *self
            .exec_delay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(ExecOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
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
        let node = target.node.clone();
        if self
            .unreachable
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&node)
        {
            return Box::pin(async move { Err(SqlError::ConnRefused { node }) });
        }

        let result: Result<Vec<SqlRow>, SqlError> = if statement.contains("pg_is_in_recovery") {
            let in_recovery = !self.is_node_primary(&node);
            Ok(vec![SqlRow(
                [("in_recovery".to_string(), SqlValue::Bool(in_recovery))].into(),
            )])
        } else if statement.contains("pg_wal_lsn_diff") {
            let gap = *self
                .gap_bytes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(vec![SqlRow([("gap".to_string(), SqlValue::Int(gap))].into())])
        } else if statement.contains("pg_current_wal_lsn")
            || statement.contains("pg_last_wal_receive_lsn")
            || statement.contains("pg_last_wal_replay_lsn")
        {
            Ok(vec![SqlRow(
                [("lsn".to_string(), SqlValue::Text("0/0".to_string()))].into(),
            )])
        } else {
            Ok(vec![SqlRow(
                [("ready".to_string(), SqlValue::Int(1))].into(),
            )])
        };
        Box::pin(async move { result })
    }
}
