use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{
    keepalive_config::KeepaliveConfig,
    paths::ProjectPaths,
    server_config::{ReconnectConfig, ServerConfig},
};
use crate::transport::ServerTarget;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("IO error reading config: {0}")]
    IoError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub server: ServerConfig,

    /// Player name sent in Login Start
    pub username: String,

    /// Seconds to wait for the login phase to finish before giving up
    pub connect_timeout_secs: u64,

    pub reconnect: ReconnectConfig,

    pub keepalive: KeepaliveConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            username: "BotAFK".to_string(),
            connect_timeout_secs: 30,
            reconnect: ReconnectConfig::default(),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

impl BotConfig {
    pub fn config_path() -> PathBuf {
        ProjectPaths::new("afkbot")
            .map(|paths| paths.config_dir())
            .unwrap_or_else(|| PathBuf::from(".afkbot"))
            .join("config.toml")
    }

    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config =
            toml::from_str(&content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the given file, or the default location when no file is given.
    ///
    /// A missing file at the default location is not an error: the built-in
    /// defaults are used instead. A missing explicit file is.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::load() {
                Ok(config) => Ok(config),
                Err(ConfigLoadError::NotFound(path)) => {
                    info!("No config at {}, using defaults", path.display());
                    Ok(Self::default())
                }
                Err(e) => Err(e),
            },
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path();

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(&path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn target(&self) -> ServerTarget {
        ServerTarget {
            host: self.server.host.clone(),
            port: self.server.port,
            username: self.username.clone(),
        }
    }
}
