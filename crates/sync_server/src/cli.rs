//! Command-line interface handling for the sync server.
//!
//! Arguments are parsed with the `clap` builder API. Every option overrides
//! the matching configuration file setting.

use crate::config::AppConfig;
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the tick interval in milliseconds
    pub tick_ms: Option<u64>,
    /// Optional override for the object storage directory
    pub storage_dir: Option<PathBuf>,
}

impl CliArgs {
    fn command() -> Command {
        Command::new("World Sync Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Zone-based world server with two-generation delta synchronization")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("config.toml"),
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
            .arg(
                Arg::new("tick-ms")
                    .long("tick-ms")
                    .value_name("MILLIS")
                    .help("Tick interval in milliseconds (0 disables the tick loop)")
                    .value_parser(clap::value_parser!(u64)),
            )
            .arg(
                Arg::new("storage")
                    .short('s')
                    .long("storage")
                    .value_name("DIR")
                    .help("Object storage directory"),
            )
    }

    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            tick_ms: matches.get_one::<u64>("tick-ms").copied(),
            storage_dir: matches.get_one::<String>("storage").map(PathBuf::from),
        }
    }

    /// Applies the command-line overrides to a loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(log_level) = &self.log_level {
            config.logging.level = log_level.clone();
        }

        if self.json_logs {
            config.logging.json_format = true;
        }

        if let Some(tick_ms) = self.tick_ms {
            config.server.tick_interval_ms = tick_ms;
        }

        if let Some(storage_dir) = &self.storage_dir {
            config.storage.directory = storage_dir.to_string_lossy().to_string();
        }
    }
}
