//! Deployment models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::task::TaskStatus;

/// What a deployment runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    Stack,
    Container,
}

/// Deployment status, mirrored from the driving task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl From<TaskStatus> for DeploymentStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => DeploymentStatus::Pending,
            TaskStatus::Running => DeploymentStatus::Running,
            TaskStatus::Completed => DeploymentStatus::Completed,
            TaskStatus::Failed => DeploymentStatus::Failed,
        }
    }
}

/// A named stack or container the user asked an agent to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub deployment_type: DeploymentType,

    pub status: DeploymentStatus,

    pub agent_id: String,

    /// Task currently driving this deployment. May dangle after an agent cascade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Stack: compose/env. Container: image/ports/volumes/env.
    #[serde(default)]
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Partial deployment update
#[derive(Debug, Clone, Default)]
pub struct DeploymentUpdate {
    pub status: Option<DeploymentStatus>,
    /// `Some(None)` clears the error
    pub error: Option<Option<String>>,
    pub task_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl DeploymentUpdate {
    /// Apply to a deployment, returning whether anything changed
    pub fn apply(self, deployment: &mut Deployment) -> bool {
        let mut changed = false;
        if let Some(status) = self.status {
            changed |= deployment.status != status;
            deployment.status = status;
        }
        if let Some(error) = self.error {
            changed |= deployment.error != error;
            deployment.error = error;
        }
        if let Some(task_id) = self.task_id {
            changed |= deployment.task_id.as_deref() != Some(task_id.as_str());
            deployment.task_id = Some(task_id);
        }
        if let Some(metadata) = self.metadata {
            changed |= deployment.metadata != metadata;
            deployment.metadata = metadata;
        }
        changed
    }
}

/// A deployment with its correlated task resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentView {
    #[serde(flatten)]
    pub deployment: Deployment,

    /// `None` when the correlated task no longer exists or was never set
    pub task_status: Option<TaskStatus>,
}

/// Compose stack to deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSpec {
    pub name: String,
    pub compose: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Container to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A compose stack as listed by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
