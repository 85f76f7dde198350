use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Target the process manager logs every relayed server console line under.
pub const SERVER_OUTPUT_TARGET: &str = "mcm.exec.proc.out";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `info,mcm.store=trace`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
    /// Mirror server console output into the log regardless of `level`.
    pub server_output: bool,
}

impl LoggerConfig {
    pub fn filter(&self) -> Result<EnvFilter, LoggerError> {
        let invalid = || LoggerError::InvalidLogLevel(self.level.clone());
        let filter = EnvFilter::try_new(&self.level).map_err(|_| invalid())?;
        if !self.server_output {
            return Ok(filter);
        }
        let mirror = format!("{SERVER_OUTPUT_TARGET}=trace")
            .parse()
            .map_err(|_| invalid())?;
        Ok(filter.add_directive(mirror))
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: cfg!(test) || std::io::stdout().is_terminal(),
            server_output: false,
        }
    }
}
