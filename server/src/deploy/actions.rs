//! Stack and container actions
//!
//! Each action dispatches one task and points the matching deployment at
//! it. From then on the deployment follows the task through projection.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::updates::{stack_key, UpdateGuard};
use crate::deploy::tracker::{container_metadata, stack_metadata, DeploymentTracker};
use crate::errors::FleetError;
use crate::models::deployment::{ContainerSpec, Deployment, DeploymentType, StackSpec};
use crate::models::task::{AgentTask, TaskType};
use crate::rpc::emulator::{CallOptions, CallOutcome, RpcEmulator};
use crate::tasks::queue::TaskQueue;

/// A dispatched task and the deployment it drives
#[derive(Debug, Clone, Serialize)]
pub struct Dispatched {
    pub task: AgentTask,
    pub deployment: Deployment,
}

/// Result of a waited stack update
#[derive(Debug, Clone)]
pub struct UpdateResult {
    pub deployment: Deployment,
    pub outcome: CallOutcome,
}

pub struct DeploymentActions {
    tasks: Arc<TaskQueue>,
    tracker: Arc<DeploymentTracker>,
    rpc: Arc<RpcEmulator>,
    updates: UpdateGuard,
}

impl DeploymentActions {
    pub fn new(
        tasks: Arc<TaskQueue>,
        tracker: Arc<DeploymentTracker>,
        rpc: Arc<RpcEmulator>,
        updates: UpdateGuard,
    ) -> Self {
        Self {
            tasks,
            tracker,
            rpc,
            updates,
        }
    }

    /// Bring a compose stack up, replacing its compose and env content
    pub async fn deploy_stack(&self, agent_id: &str, spec: StackSpec) -> Result<Dispatched, FleetError> {
        validate_name(&spec.name)?;
        if spec.compose.trim().is_empty() {
            return Err(FleetError::ValidationError(
                "compose content must not be empty".to_string(),
            ));
        }

        let existing = self.idle_deployment(agent_id, DeploymentType::Stack, &spec.name)?;
        let payload = serde_json::json!({
            "name": spec.name,
            "compose": spec.compose,
            "env": spec.env,
        });
        let task = self.tasks.send_task(agent_id, TaskType::ComposeUp, payload).await?;

        let deployment = match existing {
            Some(deployment) => {
                self.tracker
                    .assign_task(&deployment.id, &task.id, Some(stack_metadata(&spec)))
                    .await?
            }
            None => {
                self.tracker
                    .create_stack_deployment(agent_id, &spec, Some(task.id.clone()))
                    .await?
            }
        };
        self.sync(task, deployment).await
    }

    pub async fn stop_stack(&self, agent_id: &str, name: &str) -> Result<Dispatched, FleetError> {
        self.stack_task(agent_id, name, TaskType::ComposeDown).await
    }

    pub async fn restart_stack(&self, agent_id: &str, name: &str) -> Result<Dispatched, FleetError> {
        self.stack_task(agent_id, name, TaskType::ComposeRestart).await
    }

    /// Pull and recreate a stack, waiting for the agent to finish.
    ///
    /// Only one update per stack runs at a time; a second caller gets
    /// `UpdateInProgress` instead of queueing behind the first.
    pub async fn update_stack(
        &self,
        agent_id: &str,
        name: &str,
        options: CallOptions,
    ) -> Result<UpdateResult, FleetError> {
        validate_name(name)?;
        let key = stack_key(agent_id, name);
        let Some(ticket) = self.updates.try_acquire(key.clone()) else {
            warn!(agent_id = %agent_id, stack = %name, "Stack update already running");
            return Err(FleetError::UpdateInProgress(key));
        };

        let dispatched = self.stack_task(agent_id, name, TaskType::StackUpdate).await?;
        let deployment_id = dispatched.deployment.id.clone();
        let outcome = self
            .rpc
            .wait_for(dispatched.task, options, std::future::pending::<()>())
            .await?;

        info!(
            agent_id = %agent_id,
            stack = %name,
            key = %ticket.key(),
            completed = outcome.is_completed(),
            "Stack update finished"
        );
        Ok(UpdateResult {
            deployment: self.tracker.get_deployment(&deployment_id)?,
            outcome,
        })
    }

    /// Start a single container
    pub async fn run_container(
        &self,
        agent_id: &str,
        spec: ContainerSpec,
    ) -> Result<Dispatched, FleetError> {
        validate_name(&spec.name)?;
        if spec.image.trim().is_empty() {
            return Err(FleetError::ValidationError("image must not be empty".to_string()));
        }

        let existing = self.idle_deployment(agent_id, DeploymentType::Container, &spec.name)?;
        let payload = serde_json::json!({
            "name": spec.name,
            "image": spec.image,
            "ports": spec.ports,
            "volumes": spec.volumes,
            "env": spec.env,
        });
        let task = self.tasks.send_task(agent_id, TaskType::ContainerRun, payload).await?;

        let deployment = match existing {
            Some(deployment) => {
                self.tracker
                    .assign_task(&deployment.id, &task.id, Some(container_metadata(&spec)))
                    .await?
            }
            None => {
                self.tracker
                    .create_container_deployment(agent_id, &spec, Some(task.id.clone()))
                    .await?
            }
        };
        self.sync(task, deployment).await
    }

    /// Pull an image. Not tracked as a deployment.
    pub async fn pull_image(&self, agent_id: &str, image: &str) -> Result<AgentTask, FleetError> {
        if image.trim().is_empty() {
            return Err(FleetError::ValidationError("image must not be empty".to_string()));
        }
        self.tasks
            .send_task(agent_id, TaskType::ImagePull, serde_json::json!({ "image": image }))
            .await
    }

    /// Dispatch a name-only stack task and re-point (or create) its deployment
    async fn stack_task(
        &self,
        agent_id: &str,
        name: &str,
        task_type: TaskType,
    ) -> Result<Dispatched, FleetError> {
        validate_name(name)?;
        let existing = self.idle_deployment(agent_id, DeploymentType::Stack, name)?;
        let task = self
            .tasks
            .send_task(agent_id, task_type, serde_json::json!({ "name": name }))
            .await?;

        let deployment = match existing {
            Some(deployment) => self.tracker.assign_task(&deployment.id, &task.id, None).await?,
            None => {
                self.tracker
                    .create_deployment(
                        name,
                        DeploymentType::Stack,
                        agent_id,
                        serde_json::json!({}),
                        Some(task.id.clone()),
                    )
                    .await?
            }
        };
        self.sync(task, deployment).await
    }

    fn idle_deployment(
        &self,
        agent_id: &str,
        deployment_type: DeploymentType,
        name: &str,
    ) -> Result<Option<Deployment>, FleetError> {
        let existing = self.tracker.find_by_name(agent_id, deployment_type, name);
        if let Some(deployment) = &existing {
            self.tracker.ensure_idle(deployment)?;
        }
        Ok(existing)
    }

    /// Catch up with a report that landed before the deployment pointed at its task
    async fn sync(&self, task: AgentTask, deployment: Deployment) -> Result<Dispatched, FleetError> {
        let current = self.tasks.get_task(&task.id)?;
        if current.status == task.status {
            return Ok(Dispatched { task, deployment });
        }
        let deployment = self.tracker.project_task(&current).await?.unwrap_or(deployment);
        Ok(Dispatched {
            task: current,
            deployment,
        })
    }
}

fn validate_name(name: &str) -> Result<(), FleetError> {
    if name.trim().is_empty() {
        return Err(FleetError::ValidationError("name must not be empty".to_string()));
    }
    Ok(())
}
