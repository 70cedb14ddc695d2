//! Fleet-wide guarantees: registration, liveness, dispatch, cascade, ordering, timeouts

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use dockfleet::errors::FleetError;
use dockfleet::models::agent::{AgentRegistration, AgentStatus, AgentUpdate};
use dockfleet::models::deployment::{DeploymentStatus, StackSpec};
use dockfleet::models::task::{TaskStatus, TaskType};
use dockfleet::rpc::emulator::{tokio_sleep, CallOutcome};
use dockfleet::tasks::fsm::StatusReport;

use crate::common::{fleet, fleet_with, quick_options, register};

#[tokio::test]
async fn test_registration_is_idempotent() {
    let f = fleet();
    let first = register(&f, "A1", "host1").await;

    f.clock.advance(chrono::Duration::seconds(90));
    let second = f
        .app
        .registry
        .register(AgentRegistration {
            id: "A1".to_string(),
            hostname: "host1-renamed".to_string(),
            version: "1.5.0".to_string(),
            capabilities: ["compose".to_string()].into(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(f.app.registry.list_agents().len(), 1);
    assert_eq!(second.registered_at, first.registered_at);
    assert!(second.last_seen > first.last_seen);
    assert_eq!(second.hostname, "host1-renamed");
    assert_eq!(second.version, "1.5.0");
    assert_eq!(second.capabilities.len(), 1);
    assert_eq!(second.status, AgentStatus::Online);
}

#[tokio::test]
async fn test_liveness_boundary_ignores_stored_status() {
    let f = fleet();
    let agent = register(&f, "A1", "host1").await;

    // a stale label must not matter while heartbeats are fresh
    f.app
        .registry
        .update_agent(
            "A1",
            AgentUpdate {
                status: Some(AgentStatus::Offline),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    f.clock.advance(chrono::Duration::seconds(4 * 60 + 59));
    let stored = f.app.registry.get_agent("A1").unwrap();
    assert_eq!(stored.status, AgentStatus::Offline);
    assert!(f.app.liveness.is_online(&stored));

    f.clock.advance(chrono::Duration::seconds(2));
    let stored = f.app.registry.get_agent("A1").unwrap();
    assert!(!f.app.liveness.is_online(&stored));
    assert_eq!(stored.last_seen, agent.last_seen);

    f.app.registry.update_heartbeat("A1").await.unwrap();
    let stored = f.app.registry.get_agent("A1").unwrap();
    assert_eq!(f.app.liveness.effective_status(&stored), AgentStatus::Online);
}

#[tokio::test]
async fn test_dispatch_to_offline_agent_leaves_no_row() {
    let f = fleet();
    register(&f, "A1", "host1").await;
    f.clock.advance(chrono::Duration::seconds(301));

    let result = f
        .app
        .tasks
        .send_task("A1", TaskType::StackList, serde_json::json!({}))
        .await;
    assert!(matches!(result, Err(FleetError::AgentOffline { .. })));
    assert!(f.app.tasks.list_tasks(Some("A1")).is_empty());

    let unknown = f
        .app
        .tasks
        .send_task("nobody", TaskType::StackList, serde_json::json!({}))
        .await;
    assert!(matches!(unknown, Err(FleetError::AgentNotFound(_))));
}

#[tokio::test]
async fn test_cascade_delete_keeps_deployments_readable() {
    let f = fleet();
    register(&f, "A1", "host1").await;
    register(&f, "A2", "host2").await;

    let dispatched = f
        .app
        .actions
        .deploy_stack(
            "A1",
            StackSpec {
                name: "web".to_string(),
                compose: "services: {web: {image: nginx}}".to_string(),
                env: BTreeMap::new(),
            },
        )
        .await
        .unwrap();
    f.app
        .tasks
        .send_task("A1", TaskType::StackList, serde_json::json!({}))
        .await
        .unwrap();
    let survivor = f
        .app
        .tasks
        .send_task("A2", TaskType::StackList, serde_json::json!({}))
        .await
        .unwrap();

    let removed = f.app.registry.delete_agent("A1").await.unwrap();
    assert_eq!(removed, 2);
    assert!(matches!(f.app.registry.get_agent("A1"), Err(FleetError::AgentNotFound(_))));
    assert!(matches!(
        f.app.tasks.get_task(&dispatched.task.id),
        Err(FleetError::TaskNotFound(_))
    ));
    assert!(f.app.tasks.get_task(&survivor.id).is_ok());

    let view = f.app.tracker.describe_deployment(&dispatched.deployment.id).unwrap();
    assert!(view.task_status.is_none());
    assert_eq!(view.deployment.status, DeploymentStatus::Pending);
    assert_eq!(view.deployment.task_id.as_deref(), Some(dispatched.task.id.as_str()));

    assert!(matches!(
        f.app.registry.delete_agent("A1").await,
        Err(FleetError::AgentNotFound(_))
    ));
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let f = fleet();
    register(&f, "A1", "host1").await;
    let task = f
        .app
        .tasks
        .send_task("A1", TaskType::ComposeUp, serde_json::json!({}))
        .await
        .unwrap();

    f.app
        .tasks
        .update_task_status(&task.id, StatusReport::completed(serde_json::json!({"ok": true})))
        .await
        .unwrap();

    for regression in [
        StatusReport::new(TaskStatus::Running),
        StatusReport::failed("late failure"),
    ] {
        let result = f.app.tasks.update_task_status(&task.id, regression).await;
        assert!(matches!(result, Err(FleetError::InvalidTransition { .. })));
    }

    let repeat = f
        .app
        .tasks
        .update_task_status(&task.id, StatusReport::completed(serde_json::json!({"ok": false})))
        .await
        .unwrap();
    assert!(!repeat.changed());

    let stored = f.app.tasks.get_task(&task.id).unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.result, Some(serde_json::json!({"ok": true})));
}

#[tokio::test]
async fn test_call_times_out_after_attempt_budget() {
    let f = fleet_with(quick_options(3), tokio_sleep());
    register(&f, "A1", "host1").await;

    let started = Instant::now();
    let outcome = f
        .app
        .rpc
        .call_and_wait(
            "A1",
            TaskType::StackList,
            serde_json::json!({}),
            quick_options(3),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(30));
    match outcome {
        CallOutcome::TimedOut { task_id, attempts } => {
            assert_eq!(attempts, 3);
            // the task is left queued for the agent
            assert_eq!(f.app.tasks.get_task(&task_id).unwrap().status, TaskStatus::Pending);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}
