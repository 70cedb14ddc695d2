//! Agent models

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use agent_protocol::models::{AgentMetrics, DockerInfo};

/// Stored liveness label. Authoritative liveness is derived by `LivenessMonitor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Online => f.write_str("online"),
            AgentStatus::Offline => f.write_str("offline"),
        }
    }
}

/// A remote Docker host running agent software
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identity assigned at registration
    pub id: String,

    pub hostname: String,

    #[serde(default)]
    pub platform: String,

    /// Agent software version
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Last value written by a heartbeat or registration, may lag reality
    pub status: AgentStatus,

    pub last_seen: DateTime<Utc>,

    pub registered_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AgentMetrics>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_info: Option<DockerInfo>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Fields an agent provides when registering
#[derive(Debug, Clone, Default)]
pub struct AgentRegistration {
    pub id: String,
    pub hostname: String,
    pub platform: String,
    pub version: String,
    pub capabilities: BTreeSet<String>,
    pub metrics: Option<AgentMetrics>,
    pub docker_info: Option<DockerInfo>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl From<agent_protocol::models::RegisterRequest> for AgentRegistration {
    fn from(req: agent_protocol::models::RegisterRequest) -> Self {
        Self {
            id: req.agent_id,
            hostname: req.hostname,
            platform: req.platform,
            version: req.version,
            capabilities: req.capabilities,
            metrics: req.metrics,
            docker_info: req.docker_info,
            metadata: req.metadata,
        }
    }
}

/// Partial agent update. `last_seen` and `registered_at` are not updatable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdate {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: Option<BTreeSet<String>>,
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub metrics: Option<AgentMetrics>,
    #[serde(default)]
    pub docker_info: Option<DockerInfo>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AgentUpdate {
    pub fn apply(self, agent: &mut Agent) {
        if let Some(hostname) = self.hostname {
            agent.hostname = hostname;
        }
        if let Some(platform) = self.platform {
            agent.platform = platform;
        }
        if let Some(version) = self.version {
            agent.version = version;
        }
        if let Some(capabilities) = self.capabilities {
            agent.capabilities = capabilities;
        }
        if let Some(status) = self.status {
            agent.status = status;
        }
        if let Some(metrics) = self.metrics {
            agent.metrics = Some(metrics);
        }
        if let Some(docker_info) = self.docker_info {
            agent.docker_info = Some(docker_info);
        }
        if let Some(metadata) = self.metadata {
            agent.metadata = metadata;
        }
    }
}
