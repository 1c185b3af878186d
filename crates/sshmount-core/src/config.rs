//! Configuration system for sshmount
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/sshmount/config.toml
//! - Linux: ~/.config/sshmount/config.toml
//! - Windows: %APPDATA%/sshmount/config.toml

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{id_map, IdMap, IdMapping};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How to reach the remote host
    pub ssh: SshConfig,
    /// Commands used to locate sshfs on the remote host
    pub probe: ProbeConfig,
    /// Local side of the bridge
    pub bridge: BridgeConfig,
    /// Default id maps
    pub mount: MountConfig,
}

/// ssh client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// ssh client binary
    pub ssh_binary: PathBuf,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    /// Extra `-o` options handed to ssh
    pub options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            ssh_binary: PathBuf::from("ssh"),
            host: "localhost".into(),
            port: 22,
            user: None,
            identity_file: None,
            options: Vec::new(),
        }
    }
}

/// Remote probe commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Prefix for commands needing elevated privilege (empty to disable)
    pub elevate: String,
    /// Helper printing the environment of the self-contained sshfs package
    pub snap_env_helper: String,
    /// Executable name looked up on the remote search path
    pub sshfs_name: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            elevate: "sudo".into(),
            snap_env_helper: "multipass-sshfs.env".into(),
            sshfs_name: "sshfs".into(),
        }
    }
}

impl ProbeConfig {
    /// Prefix `command` with the elevation prefix, if any
    pub fn elevated(&self, command: &str) -> String {
        if self.elevate.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", self.elevate, command)
        }
    }
}

/// Local sftp-server side of the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Local sftp-server binary answering the remote sshfs
    pub sftp_server: PathBuf,
    /// How often the serve loop checks for shutdown (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sftp_server: PathBuf::from("/usr/lib/openssh/sftp-server"),
            poll_interval_ms: 200,
        }
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Default id maps applied to every mount
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// `"REMOTE:LOCAL"` uid entries
    pub uid_map: Vec<IdMapping>,
    /// `"REMOTE:LOCAL"` gid entries
    pub gid_map: Vec<IdMapping>,
}

impl MountConfig {
    pub fn uid_map(&self) -> IdMap {
        id_map(&self.uid_map)
    }

    pub fn gid_map(&self) -> IdMap {
        id_map(&self.gid_map)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!(path = ?path, error = %e, "failed to load config, using defaults");
                Self::default()
            }),
            None => {
                debug!("no config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = ?path, "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;

        info!(path = ?path, "loaded config");
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!(path = ?path, "saved config");
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "sshmount", "sshmount")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
