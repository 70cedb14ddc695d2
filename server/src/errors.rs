//! Error types for the Dockfleet server

use agent_protocol::models::TaskStatus;
use thiserror::Error;

/// Main error type for the Dockfleet server
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),

    /// Dispatch refused because the agent's derived liveness is offline
    #[error("Agent {agent_id} is offline (last seen {last_seen})")]
    AgentOffline { agent_id: String, last_seen: String },

    #[error("Invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// The deployment is still driven by an unfinished task
    #[error("Deployment {deployment_id} is busy with task {task_id}")]
    DeploymentBusy {
        deployment_id: String,
        task_id: String,
    },

    #[error("Update already in progress: {0}")]
    UpdateInProgress(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// Stable machine-readable code for callers that branch on the error kind
    pub fn code(&self) -> &'static str {
        match self {
            FleetError::IoError(_) => "io_error",
            FleetError::JsonError(_) => "json_error",
            FleetError::StorageError(_) => "storage_error",
            FleetError::AgentNotFound(_) => "agent_not_found",
            FleetError::TaskNotFound(_) => "task_not_found",
            FleetError::DeploymentNotFound(_) => "deployment_not_found",
            FleetError::AgentOffline { .. } => "agent_offline",
            FleetError::InvalidTransition { .. } => "invalid_transition",
            FleetError::DeploymentBusy { .. } => "deployment_busy",
            FleetError::UpdateInProgress(_) => "update_in_progress",
            FleetError::ValidationError(_) => "validation_error",
            FleetError::ConfigError(_) => "config_error",
            FleetError::ServerError(_) => "server_error",
            FleetError::ShutdownError(_) => "shutdown_error",
            FleetError::Internal(_) => "internal_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FleetError::AgentNotFound(_)
                | FleetError::TaskNotFound(_)
                | FleetError::DeploymentNotFound(_)
        )
    }
}

impl From<anyhow::Error> for FleetError {
    fn from(err: anyhow::Error) -> Self {
        FleetError::Internal(err.to_string())
    }
}
