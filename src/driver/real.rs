//! Production `NodeDriver`: shells out to a container runtime for `exec`,
//! and opens a fresh `sqlx` connection per call for `sql` (connection
//! pooling is explicitly an optimization the spec defers; see module docs).

use super::{ExecOutput, NodeDriver, SqlRow, SqlTarget, SqlValue};
use crate::config::Credentials;
use crate::error::{DriverError, SqlError};
use futures::future::BoxFuture;
use secrecy::ExposeSecret;
use sqlx::{Column, Row, postgres::PgConnectOptions, postgres::PgConnection};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Drives nodes via a container CLI (`docker`/`podman`) for `exec` and raw
/// `sqlx` connections for `sql`.
pub struct RealNodeDriver {
    exec_runtime: String,
}

impl RealNodeDriver {
    #[must_use]
    pub fn new(exec_runtime: String) -> Self {
        Self { exec_runtime }
    }
}

fn classify_sqlx_error(node: &str, err: &sqlx::Error) -> SqlError {
    match err {
        sqlx::Error::Io(_) => SqlError::ConnRefused {
            node: node.to_string(),
        },
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("28P01" | "28000") => SqlError::AuthFailed {
                node: node.to_string(),
            },
            Some("25006") => SqlError::ReadOnly {
                node: node.to_string(),
            },
            code => SqlError::Other {
                node: node.to_string(),
                code: code.unwrap_or("unknown").to_string(),
                message: db_err.message().to_string(),
            },
        },
        other => SqlError::Other {
            node: node.to_string(),
            code: "OTHER".to_string(),
            message: other.to_string(),
        },
    }
}

fn row_to_sql_row(row: &sqlx::postgres::PgRow) -> SqlRow {
    let mut columns = std::collections::HashMap::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<bool, _>(idx) {
            SqlValue::Bool(v)
        } else if let Ok(v) = row.try_get::<i64, _>(idx) {
            SqlValue::Int(v)
        } else if let Ok(v) = row.try_get::<i32, _>(idx) {
            SqlValue::Int(i64::from(v))
        } else if let Ok(v) = row.try_get::<f64, _>(idx) {
            SqlValue::Float(v)
        } else if let Ok(v) = row.try_get::<String, _>(idx) {
            SqlValue::Text(v)
        } else {
            SqlValue::Null
        };
        columns.insert(column.name().to_string(), value);
    }
    SqlRow(columns)
}

impl NodeDriver for RealNodeDriver {
    #[instrument(skip(self, argv), fields(container, argv = ?argv))]
    fn exec<'a>(
        &'a self,
        container: &'a str,
        argv: &'a [&'a str],
        deadline: Duration,
    ) -> BoxFuture<'a, Result<ExecOutput, DriverError>> {
        Box::pin(async move {
            let run = async {
                Command::new(&self.exec_runtime)
                    .arg("exec")
                    .arg(container)
                    .args(argv)
                    .output()
                    .await
            };

            match tokio::time::timeout(deadline, run).await {
                Ok(Ok(output)) => Ok(ExecOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }),
                Ok(Err(err)) => {
                    warn!(container, error = %err, "failed to spawn exec runtime");
                    Err(DriverError::Unreachable {
                        container: container.to_string(),
                        reason: err.to_string(),
                    })
                }
                Err(_) => Err(DriverError::Deadline {
                    container: container.to_string(),
                }),
            }
        })
    }

    #[instrument(skip(self, credentials, statement), fields(node = %target.node))]
    fn sql<'a>(
        &'a self,
        target: &'a SqlTarget,
        credentials: &'a Credentials,
        statement: &'a str,
        deadline: Duration,
    ) -> BoxFuture<'a, Result<Vec<SqlRow>, SqlError>> {
        Box::pin(async move {
            let run = async {
                let options = PgConnectOptions::new()
                    .host(&target.host)
                    .port(target.port)
                    .username(&credentials.user)
                    .password(credentials.password.expose_secret())
                    .database(&credentials.database);

                let mut conn = PgConnection::connect_with(&options)
                    .await
                    .map_err(|e| classify_sqlx_error(&target.node, &e))?;

                let rows = sqlx::query(statement)
                    .fetch_all(&mut conn)
                    .await
                    .map_err(|e| classify_sqlx_error(&target.node, &e))?;

                Ok(rows.iter().map(row_to_sql_row).collect())
            };

            match tokio::time::timeout(deadline, run).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(node = %target.node, "sql call timed out");
                    Err(SqlError::Timeout {
                        node: target.node.clone(),
                    })
                }
            }
        })
    }
}
