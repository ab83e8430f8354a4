//! Typed configuration assembled once at startup from CLI flags / environment.

use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

/// Kind of a registered node. `Backup` nodes are promotable; `Replica` nodes
/// are pinned read-only and may never be selected as a promotion target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Backup,
    Replica,
}

impl std::str::FromStr for NodeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "backup" => Ok(Self::Backup),
            "replica" => Ok(Self::Replica),
            other => Err(anyhow!("invalid node kind: {other}")),
        }
    }
}

/// A node record as it appears in the `INITIAL_NODES` configuration list.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub container: String,
    pub host: String,
    pub port: u16,
    pub kind: NodeKind,
}

/// The single `(user, password, database)` triple used for every SQL session.
/// Process-wide, immutable after startup.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: SecretString,
    pub database: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Typed configuration for the control plane process.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub credentials: Credentials,
    pub healthy_lag_bytes: i64,
    pub promote_deadline: Duration,
    pub demote_deadline: Duration,
    pub probe_deadline: Duration,
    pub initial_nodes: Vec<NodeSpec>,
    pub exec_runtime: String,
}

impl Config {
    /// Build a `Config` from already-parsed CLI/env values.
    ///
    /// # Errors
    ///
    /// Returns an error if `initial_nodes_json` is present but not valid JSON,
    /// or if it decodes to something other than an array of node records.
    pub fn new(
        listen_addr: String,
        db_user: String,
        db_password: SecretString,
        db_name: String,
        healthy_lag_bytes: i64,
        promote_deadline_secs: u64,
        demote_deadline_secs: u64,
        probe_deadline_secs: u64,
        initial_nodes_json: Option<&str>,
        exec_runtime: String,
    ) -> Result<Self> {
        let initial_nodes = match initial_nodes_json {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
                .context("INITIAL_NODES must be a JSON array of {name,container,host,port,kind}")?,
            _ => Vec::new(),
        };

        Ok(Self {
            listen_addr,
            credentials: Credentials {
                user: db_user,
                password: db_password,
                database: db_name,
            },
            healthy_lag_bytes,
            promote_deadline: Duration::from_secs(promote_deadline_secs),
            demote_deadline: Duration::from_secs(demote_deadline_secs),
            probe_deadline: Duration::from_secs(probe_deadline_secs),
            initial_nodes,
            exec_runtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn base() -> (String, String, SecretString, String) {
        (
            ":5001".to_string(),
            "postgres".to_string(),
            SecretString::from("hunter2"),
            "postgres".to_string(),
        )
    }

    #[test]
    fn parses_initial_nodes_json() {
        let (listen, user, pass, db) = base();
        let json = r#"[{"name":"node1","container":"c1","host":"h1","port":5432,"kind":"backup"}]"#;
        let cfg = Config::new(
            listen,
            user,
            pass,
            db,
            1_048_576,
            180,
            120,
            5,
            Some(json),
            "docker".to_string(),
        )
        .expect("valid config");

        assert_eq!(cfg.initial_nodes.len(), 1);
        assert_eq!(cfg.initial_nodes[0].name, "node1");
        assert_eq!(cfg.initial_nodes[0].kind, NodeKind::Backup);
        assert_eq!(cfg.promote_deadline, Duration::from_secs(180));
    }

    #[test]
    fn empty_initial_nodes_is_fine() {
        let (listen, user, pass, db) = base();
        let cfg = Config::new(listen, user, pass, db, 1_048_576, 180, 120, 5, None, "docker".to_string())
            .expect("valid config");
        assert!(cfg.initial_nodes.is_empty());
    }

    #[test]
    fn rejects_malformed_initial_nodes() {
        let (listen, user, pass, db) = base();
        let result = Config::new(
            listen,
            user,
            pass,
            db,
            1_048_576,
            180,
            120,
            5,
            Some("not json"),
            "docker".to_string(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn node_kind_parses_case_insensitively() {
        assert_eq!("BACKUP".parse::<NodeKind>().unwrap(), NodeKind::Backup);
        assert_eq!("replica".parse::<NodeKind>().unwrap(), NodeKind::Replica);
        assert!("bogus".parse::<NodeKind>().is_err());
    }
}
