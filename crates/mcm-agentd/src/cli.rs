use std::{ffi::OsString, path::PathBuf};

use clap::{Arg, Command};

pub const DEFAULT_CONFIG: &str = "mcm.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: PathBuf,
    /// Overrides `[logging] level`.
    pub log_level: Option<String>,
}

impl CliArgs {
    fn command() -> Command {
        Command::new("mcm-agentd")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Runs and supervises game-server processes")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path (created with defaults when missing)")
                    .default_value(DEFAULT_CONFIG),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("FILTER")
                    .help("Log filter, e.g. info or debug,mcm.exec.proc.out=trace"),
            )
    }

    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG)),
            log_level: matches.get_one::<String>("log-level").cloned(),
        }
    }
}
