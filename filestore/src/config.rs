// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::FilestoreRecord;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub filestores: FilestoreSettings,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub probe: Option<ProbeConfig>,
}

/// Process-level flags read once when the client factory is built
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilestoreSettings {
    /// Serve legacy SMB filestores through the SMB2/3 engine
    #[serde(default)]
    pub download_via_smb2: bool,
    /// Share name for legacy SMB filestores served by the SMB2/3 engine
    #[serde(default)]
    pub legacy_share_name: Option<String>,
    #[serde(default)]
    pub dfs_enabled: bool,
    #[serde(default)]
    pub share_name_must_match_path: bool,
    /// Comma-separated `key=value` pairs applied once per process
    #[serde(default)]
    pub extra_system_properties: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    #[serde(default = "default_response_timeout")]
    pub response_timeout_seconds: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    30
}

fn default_response_timeout() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
            read_timeout_seconds: default_read_timeout(),
            response_timeout_seconds: default_response_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    pub fn response(&self) -> Duration {
        Duration::from_secs(self.response_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_max_archive_size_mb")]
    pub max_archive_size_mb: u64,
}

fn default_max_archive_size_mb() -> u64 {
    1024
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_archive_size_mb: default_max_archive_size_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logs() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: default_json_logs(),
        }
    }
}

/// One filestore for the probe binary to log in to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub filestore: FilestoreRecord,
    pub username: String,
    /// Usually supplied through `APP__PROBE__PASSWORD`
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub public_key_path: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub order: String,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.timeouts.connect_timeout_seconds == 0 {
            return Err("connect_timeout_seconds must be greater than 0".to_string());
        }
        if self.timeouts.read_timeout_seconds == 0 {
            return Err("read_timeout_seconds must be greater than 0".to_string());
        }
        if self.export.max_archive_size_mb == 0 {
            return Err("max_archive_size_mb must be greater than 0".to_string());
        }
        if self.filestores.download_via_smb2
            && self
                .filestores
                .legacy_share_name
                .as_deref()
                .is_some_and(|s| s.trim().is_empty())
        {
            return Err("legacy_share_name cannot be blank when set".to_string());
        }
        crate::process::parse_properties(&self.filestores.extra_system_properties)
            .map_err(|e| e.to_string())?;
        if let Some(probe) = &self.probe {
            if probe.username.trim().is_empty() {
                return Err("probe.username cannot be empty".to_string());
            }
        }
        Ok(())
    }
}
