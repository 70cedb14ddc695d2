//! Task status state machine
//!
//! Status only ever moves forward: pending -> running -> completed | failed.
//! A pending task may jump straight to a terminal status when the agent
//! never reported progress. Repeating the current status is a no-op, so an
//! agent may safely retry a report.

use chrono::{DateTime, Utc};

use crate::errors::FleetError;
use crate::models::task::{AgentTask, TaskStatus};

/// Error recorded when an agent reports failure without a message
pub const MISSING_ERROR_MESSAGE: &str = "task failed without an error message";

/// What applying a reported status did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The task already had this status
    Unchanged,
    /// The task moved forward
    Applied,
}

/// Check whether `from -> to` is allowed
pub fn transition(from: TaskStatus, to: TaskStatus) -> Option<Transition> {
    use TaskStatus::*;

    match (from, to) {
        (a, b) if a == b => Some(Transition::Unchanged),

        (Pending, Running) | (Pending, Completed) | (Pending, Failed) => Some(Transition::Applied),

        (Running, Completed) | (Running, Failed) => Some(Transition::Applied),

        // Backwards, or out of a terminal state
        _ => None,
    }
}

/// A status report from an agent
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
        }
    }

    pub fn completed(result: serde_json::Value) -> Self {
        Self {
            status: TaskStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Apply a report to a task, enforcing forward-only transitions
pub fn apply_report(
    task: &mut AgentTask,
    report: StatusReport,
    now: DateTime<Utc>,
) -> Result<Transition, FleetError> {
    let step = transition(task.status, report.status).ok_or_else(|| {
        FleetError::InvalidTransition {
            task_id: task.id.clone(),
            from: task.status,
            to: report.status,
        }
    })?;

    if step == Transition::Unchanged {
        return Ok(step);
    }

    match report.status {
        TaskStatus::Running => {
            task.started_at = Some(now);
        }
        TaskStatus::Completed => {
            task.started_at.get_or_insert(now);
            task.completed_at = Some(now);
            task.result = report.result;
            task.error = None;
        }
        TaskStatus::Failed => {
            task.started_at.get_or_insert(now);
            task.completed_at = Some(now);
            task.result = None;
            task.error = Some(
                report
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| MISSING_ERROR_MESSAGE.to_string()),
            );
        }
        TaskStatus::Pending => {
            return Err(FleetError::InvalidTransition {
                task_id: task.id.clone(),
                from: task.status,
                to: report.status,
            });
        }
    }

    task.status = report.status;
    task.updated_at = now;
    Ok(step)
}
