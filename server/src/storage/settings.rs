//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::FleetError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to daily files under the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    /// Seconds without a heartbeat before an agent reads as offline
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,

    /// Dispatch-and-wait polling
    #[serde(default)]
    pub rpc: RpcSettings,

    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_liveness_timeout() -> u64 {
    300
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            liveness_timeout_secs: default_liveness_timeout(),
            rpc: RpcSettings::default(),
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

impl Settings {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }

    pub fn max_shutdown_delay(&self) -> Duration {
        Duration::from_secs(self.max_shutdown_delay_secs)
    }

    /// Read settings from `file`. `None` when the file is absent; the caller
    /// falls back to defaults and reports it once logging is up.
    pub async fn load(file: &File) -> Result<Option<Settings>, FleetError> {
        if !file.exists().await {
            return Ok(None);
        }
        file.read_json::<Settings>().await.map(Some)
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Keep tables on disk under the data directory. Off means in-memory only.
    #[serde(default = "default_true")]
    pub persist: bool,

    /// How often heartbeat-only changes are written, in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    1000
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            persist: true,
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Polling budget for dispatch-and-wait calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    30
}

fn default_delay_ms() -> u64 {
    1000
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}
