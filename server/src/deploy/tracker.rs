//! Deployment tracker
//!
//! Deployments are durable, user-facing records whose status follows the
//! task currently driving them. Correlation is by value through `task_id`;
//! the tracker reads tasks but never writes them.

use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::errors::FleetError;
use crate::models::deployment::{
    ContainerSpec, Deployment, DeploymentStatus, DeploymentType, DeploymentUpdate, DeploymentView,
    StackSpec,
};
use crate::models::task::AgentTask;
use crate::store::Store;
use crate::utils::generate_uuid;

/// Deployment tracker built on the store
pub struct DeploymentTracker {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl DeploymentTracker {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a pending deployment
    pub async fn create_deployment(
        &self,
        name: &str,
        deployment_type: DeploymentType,
        agent_id: &str,
        metadata: serde_json::Value,
        task_id: Option<String>,
    ) -> Result<Deployment, FleetError> {
        if name.trim().is_empty() {
            return Err(FleetError::ValidationError(
                "deployment name must not be empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let deployment = Deployment {
            id: generate_uuid(),
            name: name.to_string(),
            deployment_type,
            status: DeploymentStatus::Pending,
            agent_id: agent_id.to_string(),
            task_id,
            error: None,
            metadata,
            created_at: now,
            updated_at: now,
        };

        let deployment = self.store.deployments.upsert(deployment).await?;
        info!(
            deployment_id = %deployment.id,
            agent_id = %agent_id,
            name = %name,
            "Deployment created"
        );
        Ok(deployment)
    }

    /// Create a stack deployment carrying its compose and env content
    pub async fn create_stack_deployment(
        &self,
        agent_id: &str,
        spec: &StackSpec,
        task_id: Option<String>,
    ) -> Result<Deployment, FleetError> {
        self.create_deployment(
            &spec.name,
            DeploymentType::Stack,
            agent_id,
            stack_metadata(spec),
            task_id,
        )
        .await
    }

    /// Create a container deployment carrying image, ports and volumes
    pub async fn create_container_deployment(
        &self,
        agent_id: &str,
        spec: &ContainerSpec,
        task_id: Option<String>,
    ) -> Result<Deployment, FleetError> {
        self.create_deployment(
            &spec.name,
            DeploymentType::Container,
            agent_id,
            container_metadata(spec),
            task_id,
        )
        .await
    }

    /// Apply a partial update; `updated_at` moves only when something changed
    pub async fn update_deployment(
        &self,
        id: &str,
        update: DeploymentUpdate,
    ) -> Result<Deployment, FleetError> {
        let now = self.clock.now();
        let (_, deployment) = self
            .store
            .deployments
            .modify(id, |deployment| {
                if update.apply(deployment) {
                    deployment.updated_at = now;
                }
                Ok(())
            })
            .await?
            .ok_or_else(|| FleetError::DeploymentNotFound(id.to_string()))?;
        Ok(deployment)
    }

    pub fn get_deployment(&self, id: &str) -> Result<Deployment, FleetError> {
        self.store
            .deployments
            .get(id)
            .ok_or_else(|| FleetError::DeploymentNotFound(id.to_string()))
    }

    /// Deployments, optionally for one agent, most recently updated first
    pub fn list_deployments(&self, agent_id: Option<&str>) -> Vec<Deployment> {
        let mut deployments = match agent_id {
            Some(agent_id) => self.store.deployments.filter(|d| d.agent_id == agent_id),
            None => self.store.deployments.list(),
        };
        deployments.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        deployments
    }

    /// Deployment plus the status of its correlated task, if that task still exists
    pub fn describe_deployment(&self, id: &str) -> Result<DeploymentView, FleetError> {
        let deployment = self.get_deployment(id)?;
        Ok(self.view(deployment))
    }

    pub fn view(&self, deployment: Deployment) -> DeploymentView {
        let task_status = deployment
            .task_id
            .as_deref()
            .and_then(|task_id| self.store.tasks.get(task_id))
            .map(|task| task.status);
        DeploymentView {
            deployment,
            task_status,
        }
    }

    /// Most recently created deployment with this agent, type and name
    pub fn find_by_name(
        &self,
        agent_id: &str,
        deployment_type: DeploymentType,
        name: &str,
    ) -> Option<Deployment> {
        self.store
            .deployments
            .filter(|d| d.agent_id == agent_id && d.deployment_type == deployment_type && d.name == name)
            .into_iter()
            .max_by_key(|d| d.created_at)
    }

    /// Refuse while the deployment's current task is unfinished. A task id
    /// that no longer resolves does not block.
    pub fn ensure_idle(&self, deployment: &Deployment) -> Result<(), FleetError> {
        let Some(task_id) = deployment.task_id.as_deref() else {
            return Ok(());
        };
        match self.store.tasks.get(task_id) {
            Some(task) if !task.status.is_terminal() => Err(FleetError::DeploymentBusy {
                deployment_id: deployment.id.clone(),
                task_id: task_id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Hand a deployment to a new task: back to pending with the old error cleared
    pub async fn assign_task(
        &self,
        deployment_id: &str,
        task_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Deployment, FleetError> {
        let update = DeploymentUpdate {
            status: Some(DeploymentStatus::Pending),
            error: Some(None),
            task_id: Some(task_id.to_string()),
            metadata,
        };
        let deployment = self.update_deployment(deployment_id, update).await?;
        info!(
            deployment_id = %deployment_id,
            task_id = %task_id,
            "Deployment re-pointed"
        );
        Ok(deployment)
    }

    /// Mirror a task's status and error onto the deployment it drives.
    ///
    /// Best effort: a task without a deployment is normal. Re-projecting the
    /// same status leaves the row untouched.
    pub async fn project_task(&self, task: &AgentTask) -> Result<Option<Deployment>, FleetError> {
        let Some(target) = self
            .store
            .deployments
            .filter(|d| d.task_id.as_deref() == Some(task.id.as_str()))
            .into_iter()
            .next()
        else {
            return Ok(None);
        };

        let update = DeploymentUpdate {
            status: Some(DeploymentStatus::from(task.status)),
            error: Some(task.error.clone()),
            ..Default::default()
        };
        let deployment = self.update_deployment(&target.id, update).await?;

        debug!(
            deployment_id = %deployment.id,
            task_id = %task.id,
            status = ?deployment.status,
            "Projected task status onto deployment"
        );
        Ok(Some(deployment))
    }
}

pub fn stack_metadata(spec: &StackSpec) -> serde_json::Value {
    serde_json::json!({
        "compose": spec.compose,
        "env": spec.env,
    })
}

pub fn container_metadata(spec: &ContainerSpec) -> serde_json::Value {
    serde_json::json!({
        "image": spec.image,
        "ports": spec.ports,
        "volumes": spec.volumes,
        "env": spec.env,
    })
}
