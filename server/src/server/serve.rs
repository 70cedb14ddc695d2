//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::FleetError;
use crate::server::handlers::{
    delete_agent_handler, deploy_stack_handler, dispatch_handler, get_agent_handler,
    get_deployment_handler, get_task_handler, health_handler, heartbeat_handler,
    list_agents_handler, list_deployments_handler, list_stacks_handler, list_tasks_handler,
    poll_tasks_handler, pull_image_handler, register_handler, report_result_handler,
    restart_stack_handler, run_container_handler, stop_stack_handler, update_agent_handler,
    update_stack_handler, version_handler,
};
use crate::server::state::ServerState;

/// All routes with middleware attached
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Agent protocol
        .route("/agents/register", post(register_handler))
        .route("/agents/heartbeat", post(heartbeat_handler))
        .route("/agents/{agent_id}/tasks", get(poll_tasks_handler))
        .route(
            "/agents/{agent_id}/tasks/{task_id}/result",
            post(report_result_handler),
        )
        // Agents
        .route("/agents", get(list_agents_handler))
        .route(
            "/agents/{agent_id}",
            get(get_agent_handler)
                .patch(update_agent_handler)
                .delete(delete_agent_handler),
        )
        .route("/agents/{agent_id}/dispatch", post(dispatch_handler))
        // Tasks
        .route("/tasks", get(list_tasks_handler))
        .route("/tasks/{task_id}", get(get_task_handler))
        // Deployments
        .route("/deployments", get(list_deployments_handler))
        .route("/deployments/{deployment_id}", get(get_deployment_handler))
        // Stacks and containers
        .route(
            "/agents/{agent_id}/stacks",
            get(list_stacks_handler).post(deploy_stack_handler),
        )
        .route("/agents/{agent_id}/stacks/{name}/down", post(stop_stack_handler))
        .route("/agents/{agent_id}/stacks/{name}/restart", post(restart_stack_handler))
        .route("/agents/{agent_id}/stacks/{name}/update", post(update_stack_handler))
        .route("/agents/{agent_id}/containers", post(run_container_handler))
        .route("/agents/{agent_id}/images/pull", post(pull_image_handler))
        // State and middleware
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), FleetError>>, FleetError> {
    let app = build_router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| FleetError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| FleetError::ServerError(e.to_string()))
    });

    Ok(handle)
}
