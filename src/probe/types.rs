//! Structured values returned by `Probe`. Probes never hand back raw rows —
//! callers get typed values or a `SqlError`.

use serde::Serialize;

/// One peer row from `pg_stat_replication`, as seen from a primary.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationPeer {
    pub client_addr: String,
    pub state: String,
    pub sync_state: String,
    pub write_lag_seconds: Option<f64>,
    pub flush_lag_seconds: Option<f64>,
    pub replay_lag_seconds: Option<f64>,
}

/// One row from `pg_replication_slots`.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationSlot {
    pub slot_name: String,
    pub active: bool,
    pub restart_lsn: String,
}
