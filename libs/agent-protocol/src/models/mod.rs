//! Agent API models

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation an agent is asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    StackList,
    ComposeUp,
    ComposeDown,
    ComposeRestart,
    StackUpdate,
    ImagePull,
    DockerCommand,
    ContainerRun,
    ContainerStart,
    ContainerStop,
    ContainerRestart,
    ContainerRemove,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::StackList => "stack_list",
            TaskType::ComposeUp => "compose_up",
            TaskType::ComposeDown => "compose_down",
            TaskType::ComposeRestart => "compose_restart",
            TaskType::StackUpdate => "stack_update",
            TaskType::ImagePull => "image_pull",
            TaskType::DockerCommand => "docker_command",
            TaskType::ContainerRun => "container_run",
            TaskType::ContainerStart => "container_start",
            TaskType::ContainerStop => "container_stop",
            TaskType::ContainerRestart => "container_restart",
            TaskType::ContainerRemove => "container_remove",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Completed and failed tasks never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object counts reported by an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    #[serde(default)]
    pub containers: u32,
    #[serde(default)]
    pub images: u32,
    #[serde(default)]
    pub stacks: u32,
    #[serde(default)]
    pub networks: u32,
    #[serde(default)]
    pub volumes: u32,
}

/// Docker engine summary reported by an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub containers: u32,
    #[serde(default)]
    pub containers_running: u32,
    #[serde(default)]
    pub images: u32,
}

/// Registration request sent by an agent on startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub agent_id: String,
    pub hostname: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AgentMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_info: Option<DockerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub agent_id: String,
    pub status: String,
    pub registered_at: DateTime<Utc>,
}

/// Heartbeat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Agent-side clock, informational only
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AgentMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_info: Option<DockerInfo>,
}

/// Heartbeat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub agent_id: String,
    pub status: String,
    pub last_seen: DateTime<Utc>,
}

/// A task handed to a polling agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// Poll response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTasksResponse {
    pub tasks: Vec<PendingTask>,
}

/// Progress or completion reported by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultReport {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result report acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultResponse {
    pub task_id: String,
    pub status: TaskStatus,
    /// False when the report repeated the stored status
    pub changed: bool,
}
