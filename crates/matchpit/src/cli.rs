//! Command-line argument parsing for the orchestrator binary.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input. Every option overrides
/// the corresponding configuration file setting.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the HTTP bind address
    pub bind_address: Option<String>,
    /// Optional override for the public base URL servers call back to
    pub public_url: Option<String>,
    /// Optional override for the log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    pub fn parse() -> Self {
        let matches = Command::new("Matchpit")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Tournament orchestrator for remote game servers")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("matchpit.toml"),
            )
            .arg(
                Arg::new("bind")
                    .short('b')
                    .long("bind")
                    .value_name("ADDRESS")
                    .help("HTTP bind address (e.g., 127.0.0.1:8080)"),
            )
            .arg(
                Arg::new("public-url")
                    .long("public-url")
                    .value_name("URL")
                    .help("Public base URL game servers deliver webhooks to"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("config has a default value"),
            ),
            bind_address: matches.get_one::<String>("bind").cloned(),
            public_url: matches.get_one::<String>("public-url").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
