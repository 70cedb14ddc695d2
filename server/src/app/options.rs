//! Application configuration options

use std::time::Duration;

use crate::liveness::DEFAULT_LIVENESS_TIMEOUT;
use crate::rpc::emulator::CallOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Time without a heartbeat before an agent reads as offline
    pub liveness_timeout: Duration,

    /// Default budget for dispatch-and-wait calls
    pub rpc: CallOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            server: ServerOptions::default(),
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            rpc: CallOptions::default(),
        }
    }
}

impl AppOptions {
    /// Options for `settings`, with files under `layout`
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: settings.max_shutdown_delay(),
            },
            storage: StorageOptions {
                layout,
                persist: settings.storage.persist,
                flush_interval: Duration::from_millis(settings.storage.flush_interval_ms),
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            liveness_timeout: settings.liveness_timeout(),
            rpc: CallOptions {
                max_attempts: settings.rpc.max_attempts,
                delay: Duration::from_millis(settings.rpc.delay_ms),
            },
        }
    }
}

/// Lifecycle options for the server
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Keep tables on disk
    pub persist: bool,

    /// Period of the deferred-change flusher
    pub flush_interval: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            layout: StorageLayout::default(),
            persist: true,
            flush_interval: Duration::from_secs(1),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
