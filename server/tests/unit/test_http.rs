//! HTTP API tests

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use dockfleet::server::serve::build_router;

use crate::common::{fleet, patient_fleet, register, Fleet};

fn router(f: &Fleet) -> Router {
    build_router(Arc::new(f.app.server_state()))
}

async fn json_request(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = match body {
        Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));
    (status, json)
}

fn registration(agent_id: &str) -> Value {
    json!({
        "agent_id": agent_id,
        "hostname": "host1",
        "platform": "linux/arm64",
        "version": "1.4.0",
        "capabilities": ["compose", "docker"],
        "docker_info": {"version": "27.1.1", "containers": 4, "containers_running": 3, "images": 12}
    })
}

#[tokio::test]
async fn test_health_and_version() {
    let f = fleet();
    let app = router(&f);

    let (status, body) = json_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = json_request(&app, Method::GET, "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_agent_protocol_over_http() {
    let f = fleet();
    let app = router(&f);

    let (status, body) =
        json_request(&app, Method::POST, "/agents/register", Some(registration("A1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent_id"], "A1");
    assert_eq!(body["status"], "online");

    let (status, body) = json_request(
        &app,
        Method::POST,
        "/agents/heartbeat",
        Some(json!({"agent_id": "A1", "status": "online", "metrics": {"containers": 5}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert_eq!(f.app.registry.get_agent("A1").unwrap().metrics.unwrap().containers, 5);

    let (status, task) = json_request(
        &app,
        Method::POST,
        "/agents/A1/dispatch",
        Some(json!({"type": "stack_list"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["status"], "pending");
    assert_eq!(task["payload"], json!({}));
    let task_id = task["id"].as_str().unwrap().to_string();

    let (status, body) = json_request(&app, Method::GET, "/agents/A1/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tasks"][0]["id"], task_id.as_str());
    assert_eq!(body["tasks"][0]["type"], "stack_list");

    let result_path = format!("/agents/A1/tasks/{}/result", task_id);
    let report = json!({"status": "completed", "result": {"stacks": [{"name": "web"}]}});
    let (status, body) = json_request(&app, Method::POST, &result_path, Some(report.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["status"], "completed");

    let (status, body) = json_request(&app, Method::POST, &result_path, Some(report)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], false);

    let (status, body) = json_request(
        &app,
        Method::POST,
        &result_path,
        Some(json!({"status": "running"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");

    let (status, body) = json_request(&app, Method::GET, "/agents/A1/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tasks"], json!([]));
}

#[tokio::test]
async fn test_error_codes() {
    let f = fleet();
    let app = router(&f);
    register(&f, "A1", "host1").await;
    register(&f, "A2", "host2").await;

    let (status, body) = json_request(
        &app,
        Method::POST,
        "/agents/ghost/dispatch",
        Some(json!({"type": "stack_list"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "agent_not_found");

    let (status, body) = json_request(&app, Method::GET, "/agents/ghost/tasks", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "agent_not_found");

    // a task is invisible to agents that do not own it
    let task = f
        .app
        .tasks
        .send_task("A1", dockfleet::models::task::TaskType::StackList, json!({}))
        .await
        .unwrap();
    let (status, body) = json_request(
        &app,
        Method::POST,
        &format!("/agents/A2/tasks/{}/result", task.id),
        Some(json!({"status": "running"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "task_not_found");

    let (status, _) = json_request(&app, Method::GET, "/tasks/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = json_request(&app, Method::GET, "/deployments/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = json_request(
        &app,
        Method::POST,
        "/agents/register",
        Some(json!({"agent_id": "", "hostname": "host3"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");

    f.clock.advance(chrono::Duration::seconds(301));
    let (status, body) = json_request(
        &app,
        Method::POST,
        "/agents/A1/dispatch",
        Some(json!({"type": "image_pull", "payload": {"image": "nginx"}})),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["code"], "agent_offline");
}

#[tokio::test]
async fn test_agent_views_carry_derived_liveness() {
    let f = fleet();
    let app = router(&f);
    register(&f, "A1", "host1").await;

    let (status, body) = json_request(&app, Method::GET, "/agents/A1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online"], true);
    assert_eq!(body["tasks"]["pending"], 0);

    f.clock.advance(chrono::Duration::seconds(600));
    let (_, body) = json_request(&app, Method::GET, "/agents", None).await;
    assert_eq!(body[0]["id"], "A1");
    assert_eq!(body[0]["status"], "online");
    assert_eq!(body[0]["effective_status"], "offline");
    assert_eq!(body[0]["online"], false);

    let (status, body) = json_request(
        &app,
        Method::PATCH,
        "/agents/A1",
        Some(json!({"hostname": "edge-7"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hostname"], "edge-7");
}

#[tokio::test]
async fn test_stack_actions_over_http() {
    let f = fleet();
    let app = router(&f);
    register(&f, "A1", "host1").await;

    let spec = json!({"name": "web", "compose": "services:\n  web:\n    image: nginx\n"});
    let (status, body) =
        json_request(&app, Method::POST, "/agents/A1/stacks", Some(spec.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["task"]["type"], "compose_up");
    assert_eq!(body["deployment"]["name"], "web");
    let deployment_id = body["deployment"]["id"].as_str().unwrap().to_string();

    let (status, body) = json_request(&app, Method::POST, "/agents/A1/stacks/web/restart", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "deployment_busy");

    let (status, body) = json_request(&app, Method::GET, "/deployments?agent_id=A1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], deployment_id.as_str());
    assert_eq!(body[0]["task_status"], "pending");

    // stack listing with no agent answering gives up
    let (status, body) = json_request(&app, Method::GET, "/agents/A1/stacks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "timed_out");
    assert_eq!(body["stacks"], json!([]));

    let (status, body) = json_request(
        &app,
        Method::POST,
        "/agents/A1/images/pull",
        Some(json!({"image": "redis:7"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["type"], "image_pull");

    let (status, body) = json_request(&app, Method::DELETE, "/agents/A1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_tasks"], 3);

    let (status, body) =
        json_request(&app, Method::GET, &format!("/deployments/{}", deployment_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task_status"], Value::Null);
}

#[tokio::test]
async fn test_remote_failure_is_bad_gateway() {
    let f = patient_fleet();
    let app = router(&f);
    register(&f, "A1", "host1").await;

    let request = {
        let app = app.clone();
        tokio::spawn(async move { json_request(&app, Method::GET, "/agents/A1/stacks", None).await })
    };

    let task = loop {
        let pending = f.app.tasks.list_pending_tasks_for_agent("A1").unwrap();
        if let Some(task) = pending.into_iter().next() {
            break task;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    };
    let (status, _) = json_request(
        &app,
        Method::POST,
        &format!("/agents/A1/tasks/{}/result", task.id),
        Some(json!({"status": "failed", "error": "docker daemon not reachable"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request.await.unwrap();
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "docker daemon not reachable");
    assert_eq!(body["code"], "remote_execution_failed");
}
