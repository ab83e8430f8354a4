//! `NodeDriver`: the only component that touches a node's container or SQL
//! port directly. Everything above this layer (`probe`, `orchestrator`) talks
//! to nodes exclusively through this trait, which keeps the orchestrator's
//! step machine and the lag gate testable against a fake.

pub mod real;

use crate::config::Credentials;
use crate::error::{DriverError, SqlError};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::time::Duration;

pub use real::RealNodeDriver;

/// Result of running a shell command inside a node's container.
/// Never constructed for a connectivity failure — that is a `DriverError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One SQL column value, decoupled from any particular driver crate's row
/// type so higher layers (and their tests) never depend on a live
/// `sqlx::postgres::PgRow`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(bool),
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

/// A single decoded row. Column lookups are by name, matching how every
/// probe query in this crate is written (named columns, explicit casts).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRow(pub HashMap<String, SqlValue>);

impl SqlRow {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.get(column)
    }

    #[must_use]
    pub fn bool(&self, column: &str) -> Option<bool> {
        match self.get(column) {
            Some(SqlValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column) {
            Some(SqlValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn int(&self, column: &str) -> Option<i64> {
        match self.get(column) {
            Some(SqlValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn float(&self, column: &str) -> Option<f64> {
        match self.get(column) {
            Some(SqlValue::Float(f)) => Some(*f),
            Some(SqlValue::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }
}

/// Where to reach a node's SQL port. Carries the node's name purely for
/// error messages — driver errors are always attributed to a name the
/// operator recognizes.
#[derive(Debug, Clone)]
pub struct SqlTarget {
    pub node: String,
    pub host: String,
    pub port: u16,
}

/// The NodeDriver capability: run a command inside a container, or run one
/// SQL statement against a node. Every call carries its own deadline and
/// never retries internally — retry policy belongs to the orchestrator.
pub trait NodeDriver: Send + Sync {
    fn exec<'a>(
        &'a self,
        container: &'a str,
        argv: &'a [&'a str],
        deadline: Duration,
    ) -> BoxFuture<'a, Result<ExecOutput, DriverError>>;

    fn sql<'a>(
        &'a self,
        target: &'a SqlTarget,
        credentials: &'a Credentials,
        statement: &'a str,
        deadline: Duration,
    ) -> BoxFuture<'a, Result<Vec<SqlRow>, SqlError>>;
}
