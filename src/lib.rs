//! Control plane for a PostgreSQL streaming-replication cluster: an HTTP
//! service that observes and reshapes primary/standby topology for a small
//! fixed fleet of PostgreSQL backends.

pub mod api;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod shutdown;
pub mod topology;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}
