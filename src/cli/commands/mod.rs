use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("pg_opsd")
        .about("Control plane for a PostgreSQL streaming-replication cluster")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(built_info::GIT_COMMIT_HASH.unwrap_or("unknown").to_owned())
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("listen-addr")
                .long("listen-addr")
                .help("HTTP bind address")
                .default_value(":5001")
                .env("LISTEN_ADDR")
                .value_name("ADDR"),
        )
        .arg(
            Arg::new("db-user")
                .long("db-user")
                .help("User for every SQL session against a node")
                .default_value("postgres")
                .env("DB_USER")
                .value_name("USER"),
        )
        .arg(
            Arg::new("db-password")
                .long("db-password")
                .help("Password for every SQL session against a node")
                .default_value("")
                .env("DB_PASSWORD")
                .value_name("PASSWORD"),
        )
        .arg(
            Arg::new("db-name")
                .long("db-name")
                .help("Database name for every SQL session against a node")
                .default_value("postgres")
                .env("DB_NAME")
                .value_name("DBNAME"),
        )
        .arg(
            Arg::new("healthy-lag-bytes")
                .long("healthy-lag-bytes")
                .help("Max standby lag, in bytes, still considered HEALTHY")
                .default_value("1048576")
                .env("HEALTHY_LAG_BYTES")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("promote-deadline-seconds")
                .long("promote-deadline-seconds")
                .help("Global deadline for promote()")
                .default_value("180")
                .env("PROMOTE_DEADLINE_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("demote-deadline-seconds")
                .long("demote-deadline-seconds")
                .help("Global deadline for demote_all()")
                .default_value("120")
                .env("DEMOTE_DEADLINE_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("probe-deadline-seconds")
                .long("probe-deadline-seconds")
                .help("Per-node deadline for a single probe")
                .default_value("5")
                .env("PROBE_DEADLINE_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("initial-nodes")
                .long("initial-nodes")
                .help("JSON array of {name,container,host,port,kind} records loaded at startup")
                .env("INITIAL_NODES")
                .value_name("JSON"),
        )
        .arg(
            Arg::new("exec-runtime")
                .long("exec-runtime")
                .help("Container CLI invoked by NodeDriver's exec capability")
                .default_value("docker")
                .env("CONTAINER_EXEC_RUNTIME")
                .value_name("docker|podman"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase verbosity, -vv for debug")
                .action(ArgAction::Count),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            [
                ("DB_PASSWORD", None::<String>),
                ("LISTEN_ADDR", None),
                ("INITIAL_NODES", None),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["pg_opsd"]);

                assert_eq!(
                    matches.get_one::<String>("listen-addr").map(String::as_str),
                    Some(":5001")
                );
                assert_eq!(
                    matches.get_one::<i64>("healthy-lag-bytes").copied(),
                    Some(1_048_576)
                );
                assert_eq!(
                    matches.get_one::<u64>("promote-deadline-seconds").copied(),
                    Some(180)
                );
            },
        );
    }

    #[test]
    fn test_new() {
        let command = new();
        assert_eq!(command.get_name(), "pg_opsd");
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_overrides() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "pg_opsd",
            "--listen-addr",
            ":9999",
            "--healthy-lag-bytes",
            "2048",
            "--exec-runtime",
            "podman",
        ]);

        assert_eq!(
            matches.get_one::<String>("listen-addr").map(String::as_str),
            Some(":9999")
        );
        assert_eq!(matches.get_one::<i64>("healthy-lag-bytes").copied(), Some(2048));
        assert_eq!(
            matches.get_one::<String>("exec-runtime").map(String::as_str),
            Some("podman")
        );
    }
}
