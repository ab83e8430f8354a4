use crate::cli::actions::Action;
use crate::config::Config;
use anyhow::Result;
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let listen_addr = matches
        .get_one::<String>("listen-addr")
        .cloned()
        .unwrap_or_else(|| ":5001".to_string());
    let db_user = matches.get_one::<String>("db-user").cloned().unwrap_or_default();
    let db_password = SecretString::from(
        matches
            .get_one::<String>("db-password")
            .cloned()
            .unwrap_or_default(),
    );
    let db_name = matches.get_one::<String>("db-name").cloned().unwrap_or_default();
    let healthy_lag_bytes = matches.get_one::<i64>("healthy-lag-bytes").copied().unwrap_or(1_048_576);
    let promote_deadline_secs = matches
        .get_one::<u64>("promote-deadline-seconds")
        .copied()
        .unwrap_or(180);
    let demote_deadline_secs = matches
        .get_one::<u64>("demote-deadline-seconds")
        .copied()
        .unwrap_or(120);
    let probe_deadline_secs = matches.get_one::<u64>("probe-deadline-seconds").copied().unwrap_or(5);
    let initial_nodes_json = matches.get_one::<String>("initial-nodes").map(String::as_str);
    let exec_runtime = matches
        .get_one::<String>("exec-runtime")
        .cloned()
        .unwrap_or_else(|| "docker".to_string());

    let config = Config::new(
        listen_addr,
        db_user,
        db_password,
        db_name,
        healthy_lag_bytes,
        promote_deadline_secs,
        demote_deadline_secs,
        probe_deadline_secs,
        initial_nodes_json,
        exec_runtime,
    )?;

    Ok(Action::Run(config))
}
