//! Task models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use agent_protocol::models::{TaskStatus, TaskType};

/// One unit of work addressed to exactly one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,

    /// Owning agent
    pub agent_id: String,

    #[serde(rename = "type")]
    pub task_type: TaskType,

    /// Operation-specific input
    #[serde(default)]
    pub payload: serde_json::Value,

    pub status: TaskStatus,

    /// Present only when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Present only when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    /// Create a new pending task
    pub fn new(
        id: String,
        agent_id: String,
        task_type: TaskType,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            agent_id,
            task_type,
            payload,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn to_pending(&self) -> agent_protocol::models::PendingTask {
        agent_protocol::models::PendingTask {
            id: self.id.clone(),
            task_type: self.task_type,
            payload: self.payload.clone(),
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// Per-status task counts for one agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }
}
