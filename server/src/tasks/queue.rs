//! Task queue: dispatch and status updates

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::deploy::tracker::DeploymentTracker;
use crate::errors::FleetError;
use crate::liveness::LivenessMonitor;
use crate::models::deployment::Deployment;
use crate::models::task::{AgentTask, TaskCounts, TaskStatus, TaskType};
use crate::registry::AgentRegistry;
use crate::store::Store;
use crate::tasks::fsm::{apply_report, StatusReport, Transition};
use crate::utils::generate_uuid;

/// Dispatch and lookup, as seen by code that waits on tasks
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Enqueue a task for an agent
    async fn dispatch(
        &self,
        agent_id: &str,
        task_type: TaskType,
        payload: serde_json::Value,
    ) -> Result<AgentTask, FleetError>;

    /// Re-read a task by id
    async fn fetch(&self, task_id: &str) -> Result<AgentTask, FleetError>;
}

/// Result of a status update
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub task: AgentTask,
    pub transition: Transition,
    /// Deployment the task drives, after projection
    pub deployment: Option<Deployment>,
}

impl StatusUpdate {
    pub fn changed(&self) -> bool {
        self.transition == Transition::Applied
    }
}

/// Per-agent task queue built on the store
pub struct TaskQueue {
    store: Arc<Store>,
    registry: Arc<AgentRegistry>,
    liveness: LivenessMonitor,
    tracker: Arc<DeploymentTracker>,
    clock: Arc<dyn Clock>,
}

impl TaskQueue {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<AgentRegistry>,
        liveness: LivenessMonitor,
        tracker: Arc<DeploymentTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            liveness,
            tracker,
            clock,
        }
    }

    /// Enqueue a pending task for an online agent. No call reaches the agent;
    /// it picks the task up on its next poll.
    pub async fn send_task(
        &self,
        agent_id: &str,
        task_type: TaskType,
        payload: serde_json::Value,
    ) -> Result<AgentTask, FleetError> {
        let agent = self.registry.get_agent(agent_id)?;
        if !self.liveness.is_online(&agent) {
            warn!(
                agent_id = %agent_id,
                task_type = %task_type,
                last_seen = %agent.last_seen,
                "Refusing to dispatch to offline agent"
            );
            return Err(FleetError::AgentOffline {
                agent_id: agent_id.to_string(),
                last_seen: agent.last_seen.to_rfc3339(),
            });
        }

        let payload = match payload {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        let task = AgentTask::new(
            generate_uuid(),
            agent_id.to_string(),
            task_type,
            payload,
            self.clock.now(),
        );
        let task = self.enqueue(task).await?;

        info!(
            task_id = %task.id,
            agent_id = %agent_id,
            task_type = %task_type,
            "Task dispatched"
        );
        Ok(task)
    }

    /// Insert a task, then make sure its agent still exists. An agent deleted
    /// between the liveness check and the insert would otherwise be left with
    /// an orphan task no cascade removes.
    async fn enqueue(&self, task: AgentTask) -> Result<AgentTask, FleetError> {
        let task = self.store.tasks.upsert(task).await?;
        if !self.store.agents.contains(&task.agent_id) {
            self.store.tasks.delete(&task.id).await?;
            debug!(task_id = %task.id, agent_id = %task.agent_id, "Agent vanished during dispatch");
            return Err(FleetError::AgentNotFound(task.agent_id));
        }
        Ok(task)
    }

    /// Tasks an agent should work on: pending ones, plus running ones it may
    /// resume after a restart. Oldest first.
    pub fn list_pending_tasks_for_agent(&self, agent_id: &str) -> Result<Vec<AgentTask>, FleetError> {
        self.registry.get_agent(agent_id)?;

        let mut tasks = self.store.tasks.filter(|t| {
            t.agent_id == agent_id && matches!(t.status, TaskStatus::Pending | TaskStatus::Running)
        });
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    /// Record a status report and project it onto the correlated deployment.
    ///
    /// A repeated status is a no-op for the task; the projection still runs
    /// so a retried report repairs a projection that failed earlier.
    pub async fn update_task_status(
        &self,
        task_id: &str,
        report: StatusReport,
    ) -> Result<StatusUpdate, FleetError> {
        let now = self.clock.now();
        let reported = report.status;
        let (transition, task) = self
            .store
            .tasks
            .modify(task_id, |task| apply_report(task, report, now))
            .await?
            .ok_or_else(|| FleetError::TaskNotFound(task_id.to_string()))?;

        match transition {
            Transition::Applied => info!(
                task_id = %task_id,
                agent_id = %task.agent_id,
                status = %task.status,
                "Task status updated"
            ),
            Transition::Unchanged => debug!(
                task_id = %task_id,
                status = %reported,
                "Repeated task status ignored"
            ),
        }

        let deployment = self.tracker.project_task(&task).await?;

        Ok(StatusUpdate {
            task,
            transition,
            deployment,
        })
    }

    pub fn get_task(&self, task_id: &str) -> Result<AgentTask, FleetError> {
        self.store
            .tasks
            .get(task_id)
            .ok_or_else(|| FleetError::TaskNotFound(task_id.to_string()))
    }

    /// Tasks, optionally for one agent, newest first
    pub fn list_tasks(&self, agent_id: Option<&str>) -> Vec<AgentTask> {
        let mut tasks = match agent_id {
            Some(agent_id) => self.store.tasks.filter(|t| t.agent_id == agent_id),
            None => self.store.tasks.list(),
        };
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        tasks
    }

    /// Per-status counts for one agent
    pub fn task_counts(&self, agent_id: &str) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for task in self.store.tasks.filter(|t| t.agent_id == agent_id) {
            counts.record(task.status);
        }
        counts
    }
}

#[async_trait]
impl TaskSource for TaskQueue {
    async fn dispatch(
        &self,
        agent_id: &str,
        task_type: TaskType,
        payload: serde_json::Value,
    ) -> Result<AgentTask, FleetError> {
        self.send_task(agent_id, task_type, payload).await
    }

    async fn fetch(&self, task_id: &str) -> Result<AgentTask, FleetError> {
        self.get_task(task_id)
    }
}
