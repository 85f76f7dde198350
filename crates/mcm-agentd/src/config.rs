use std::path::{Path, PathBuf};

use mcm_exec::{LaunchConfig, ManagerConfig};
use mcm_observe::{LoggerConfig, LoggerError, LoggerFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not render default config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error(transparent)]
    Logger(#[from] LoggerError),
}

/// Contents of `mcm.toml`. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub data: DataSection,
    pub launch: LaunchConfig,
    pub fetch: FetchSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Directory holding one JSON file per collection.
    pub store_dir: PathBuf,
    /// Directory under which server directories are created.
    pub servers_dir: PathBuf,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("data/store"),
            servers_dir: PathBuf::from("data/servers"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub manifest_url: String,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            manifest_url: mcm_exec::fetch::MANIFEST_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub format: String,
    pub with_targets: bool,
    /// Mirror server console lines into the agent log.
    pub server_output: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LoggerFormat::Text.to_string(),
            with_targets: true,
            server_output: false,
        }
    }
}

impl AgentConfig {
    /// Read `path`, writing the defaults there first when it does not exist.
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if tokio::fs::try_exists(path).await.map_err(io)? {
            let content = tokio::fs::read_to_string(path).await.map_err(io)?;
            return Ok(toml::from_str(&content)?);
        }

        let config = AgentConfig::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        tokio::fs::write(path, toml::to_string_pretty(&config)?)
            .await
            .map_err(io)?;
        info!(target: "mcm.agentd", path = %path.display(), "created default configuration");
        Ok(config)
    }

    pub fn logger_config(&self, level_override: Option<&str>) -> Result<LoggerConfig, ConfigError> {
        Ok(LoggerConfig {
            format: self.logging.format.parse()?,
            level: level_override.unwrap_or(&self.logging.level).to_string(),
            with_targets: self.logging.with_targets,
            server_output: self.logging.server_output,
            ..LoggerConfig::default()
        })
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            base_path: self.data.servers_dir.clone(),
            launch: self.launch.clone(),
        }
    }
}
