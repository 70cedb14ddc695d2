//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use agent_protocol::models::{
    HeartbeatRequest, HeartbeatResponse, PendingTasksResponse, RegisterRequest, RegisterResponse,
    TaskResultReport, TaskResultResponse,
};

use crate::errors::FleetError;
use crate::models::agent::{Agent, AgentStatus, AgentUpdate};
use crate::models::deployment::{ContainerSpec, DeploymentView, StackSpec, StackSummary};
use crate::models::task::{AgentTask, TaskCounts, TaskType};
use crate::rpc::emulator::CallOutcome;
use crate::server::response::ErrorBody;
use crate::server::state::ServerState;
use crate::tasks::fsm::StatusReport;
use crate::utils::version_info;

type HandlerResult<T> = Result<T, FleetError>;

// ================================ HEALTH ===================================== //

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "dockfleet".to_string(),
        version: version.version,
    })
}

pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

// ============================ AGENT PROTOCOL ================================= //

pub async fn register_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<RegisterRequest>,
) -> HandlerResult<impl IntoResponse> {
    let agent = state.registry.register(req.into()).await?;
    Ok(Json(RegisterResponse {
        agent_id: agent.id,
        status: agent.status.to_string(),
        registered_at: agent.registered_at,
    }))
}

pub async fn heartbeat_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<HeartbeatRequest>,
) -> HandlerResult<impl IntoResponse> {
    let mut agent = state.registry.update_heartbeat(&req.agent_id).await?;
    if let Some(sent_at) = req.timestamp {
        debug!(
            agent_id = %agent.id,
            skew_ms = agent.last_seen.signed_duration_since(sent_at).num_milliseconds(),
            "Heartbeat clock skew"
        );
    }
    if req.metrics.is_some() || req.docker_info.is_some() {
        agent = state
            .registry
            .record_telemetry(&agent.id, req.metrics, req.docker_info)
            .await?;
    }

    Ok(Json(HeartbeatResponse {
        status: state.liveness.effective_status(&agent).to_string(),
        agent_id: agent.id,
        last_seen: agent.last_seen,
    }))
}

/// Poll for work. Polling counts as a heartbeat.
pub async fn poll_tasks_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    state.registry.update_heartbeat(&agent_id).await?;
    let tasks = state.tasks.list_pending_tasks_for_agent(&agent_id)?;
    Ok(Json(PendingTasksResponse {
        tasks: tasks.iter().map(AgentTask::to_pending).collect(),
    }))
}

pub async fn report_result_handler(
    State(state): State<Arc<ServerState>>,
    Path((agent_id, task_id)): Path<(String, String)>,
    Json(report): Json<TaskResultReport>,
) -> HandlerResult<impl IntoResponse> {
    // other agents' tasks are invisible
    let task = state.tasks.get_task(&task_id)?;
    if task.agent_id != agent_id {
        return Err(FleetError::TaskNotFound(task_id));
    }

    let update = state
        .tasks
        .update_task_status(
            &task_id,
            StatusReport {
                status: report.status,
                result: report.result,
                error: report.error,
            },
        )
        .await?;

    Ok(Json(TaskResultResponse {
        changed: update.changed(),
        task_id: update.task.id,
        status: update.task.status,
    }))
}

// ================================= AGENTS ==================================== //

/// An agent with its derived liveness
#[derive(Debug, Serialize)]
pub struct AgentView {
    #[serde(flatten)]
    pub agent: Agent,
    pub effective_status: AgentStatus,
    pub online: bool,
}

/// One agent with its task counts
#[derive(Debug, Serialize)]
pub struct AgentDetail {
    #[serde(flatten)]
    pub view: AgentView,
    pub tasks: TaskCounts,
}

fn agent_view(state: &ServerState, agent: Agent) -> AgentView {
    let effective_status = state.liveness.effective_status(&agent);
    AgentView {
        agent,
        effective_status,
        online: effective_status == AgentStatus::Online,
    }
}

pub async fn list_agents_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let agents: Vec<AgentView> = state
        .registry
        .list_agents()
        .into_iter()
        .map(|agent| agent_view(&state, agent))
        .collect();
    Json(agents)
}

pub async fn get_agent_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    let agent = state.registry.get_agent(&agent_id)?;
    Ok(Json(AgentDetail {
        tasks: state.tasks.task_counts(&agent_id),
        view: agent_view(&state, agent),
    }))
}

pub async fn update_agent_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    Json(update): Json<AgentUpdate>,
) -> HandlerResult<impl IntoResponse> {
    let agent = state.registry.update_agent(&agent_id, update).await?;
    Ok(Json(agent_view(&state, agent)))
}

#[derive(Debug, Serialize)]
pub struct DeleteAgentResponse {
    pub agent_id: String,
    pub deleted_tasks: usize,
}

pub async fn delete_agent_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    let deleted_tasks = state.registry.delete_agent(&agent_id).await?;
    info!(agent_id = %agent_id, deleted_tasks, "Agent deleted");
    Ok(Json(DeleteAgentResponse {
        agent_id,
        deleted_tasks,
    }))
}

// ================================== TASKS ==================================== //

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

pub async fn dispatch_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    Json(req): Json<DispatchRequest>,
) -> HandlerResult<impl IntoResponse> {
    let task = state.tasks.send_task(&agent_id, req.task_type, req.payload).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentFilter {
    pub agent_id: Option<String>,
}

pub async fn list_tasks_handler(
    State(state): State<Arc<ServerState>>,
    Query(filter): Query<AgentFilter>,
) -> impl IntoResponse {
    Json(state.tasks.list_tasks(filter.agent_id.as_deref()))
}

pub async fn get_task_handler(
    State(state): State<Arc<ServerState>>,
    Path(task_id): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.tasks.get_task(&task_id)?))
}

// =============================== DEPLOYMENTS ================================= //

pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Query(filter): Query<AgentFilter>,
) -> impl IntoResponse {
    let views: Vec<DeploymentView> = state
        .tracker
        .list_deployments(filter.agent_id.as_deref())
        .into_iter()
        .map(|deployment| state.tracker.view(deployment))
        .collect();
    Json(views)
}

pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> HandlerResult<impl IntoResponse> {
    Ok(Json(state.tracker.describe_deployment(&deployment_id)?))
}

// ================================== STACKS =================================== //

#[derive(Debug, Serialize, Deserialize)]
pub struct StacksResponse {
    pub stacks: Vec<StackSummary>,
    pub outcome: String,
    pub task_id: String,
}

/// Ask the agent for its stacks and wait for the answer
pub async fn list_stacks_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> HandlerResult<Response> {
    let response = match state.rpc.list_stacks(&agent_id).await? {
        CallOutcome::Completed { task_id, result } => Json(StacksResponse {
            stacks: result,
            outcome: "completed".to_string(),
            task_id,
        })
        .into_response(),
        CallOutcome::TimedOut { task_id, .. } => Json(StacksResponse {
            stacks: Vec::new(),
            outcome: "timed_out".to_string(),
            task_id,
        })
        .into_response(),
        CallOutcome::Failed { error, .. } => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorBody::new(error, "remote_execution_failed")),
        )
            .into_response(),
        CallOutcome::Cancelled { task_id } => {
            return Err(FleetError::Internal(format!(
                "stack listing {} was cancelled",
                task_id
            )));
        }
    };
    Ok(response)
}

pub async fn deploy_stack_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    Json(spec): Json<StackSpec>,
) -> HandlerResult<impl IntoResponse> {
    let dispatched = state.actions.deploy_stack(&agent_id, spec).await?;
    Ok((StatusCode::ACCEPTED, Json(dispatched)))
}

pub async fn stop_stack_handler(
    State(state): State<Arc<ServerState>>,
    Path((agent_id, name)): Path<(String, String)>,
) -> HandlerResult<impl IntoResponse> {
    let dispatched = state.actions.stop_stack(&agent_id, &name).await?;
    Ok((StatusCode::ACCEPTED, Json(dispatched)))
}

pub async fn restart_stack_handler(
    State(state): State<Arc<ServerState>>,
    Path((agent_id, name)): Path<(String, String)>,
) -> HandlerResult<impl IntoResponse> {
    let dispatched = state.actions.restart_stack(&agent_id, &name).await?;
    Ok((StatusCode::ACCEPTED, Json(dispatched)))
}

#[derive(Debug, Serialize)]
pub struct UpdateStackResponse {
    pub deployment: crate::models::deployment::Deployment,
    #[serde(flatten)]
    pub outcome: CallOutcome,
}

/// Update a stack and wait for the agent. Remote failure is reported in
/// the body; the deployment record carries the same error.
pub async fn update_stack_handler(
    State(state): State<Arc<ServerState>>,
    Path((agent_id, name)): Path<(String, String)>,
) -> HandlerResult<impl IntoResponse> {
    let options = state.rpc.defaults();
    let result = state.actions.update_stack(&agent_id, &name, options).await?;
    Ok(Json(UpdateStackResponse {
        deployment: result.deployment,
        outcome: result.outcome,
    }))
}

// =============================== CONTAINERS ================================== //

pub async fn run_container_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    Json(spec): Json<ContainerSpec>,
) -> HandlerResult<impl IntoResponse> {
    let dispatched = state.actions.run_container(&agent_id, spec).await?;
    Ok((StatusCode::ACCEPTED, Json(dispatched)))
}

#[derive(Debug, Deserialize)]
pub struct PullImageRequest {
    pub image: String,
}

pub async fn pull_image_handler(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    Json(req): Json<PullImageRequest>,
) -> HandlerResult<impl IntoResponse> {
    let task = state.actions.pull_image(&agent_id, &req.image).await?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}
