//! Register, heartbeat, dispatch, poll, report and wait, end to end

use std::time::Duration;

use tokio_test::assert_ok;

use dockfleet::models::deployment::{DeploymentStatus, DeploymentType};
use dockfleet::models::task::{AgentTask, TaskStatus, TaskType};
use dockfleet::rpc::emulator::{decode_stacks, CallOutcome};
use dockfleet::tasks::fsm::StatusReport;

use crate::common::{patient_fleet, register, Fleet};

async fn next_pending(f: &Fleet, agent_id: &str) -> AgentTask {
    for _ in 0..1000 {
        let pending = f.app.tasks.list_pending_tasks_for_agent(agent_id).unwrap();
        if let Some(task) = pending.into_iter().next() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("no task was dispatched to {}", agent_id);
}

#[tokio::test]
async fn test_stack_list_round_trip() {
    let f = patient_fleet();
    register(&f, "A1", "host1").await;
    f.app.registry.update_heartbeat("A1").await.unwrap();

    let rpc = f.app.rpc.clone();
    let options = rpc.defaults();
    let call = tokio::spawn(async move {
        rpc.call_and_wait(
            "A1",
            TaskType::StackList,
            serde_json::json!({}),
            options,
            std::future::pending(),
        )
        .await
    });

    // the agent polls and finds T1
    let t1 = next_pending(&f, "A1").await;
    assert_eq!(t1.task_type, TaskType::StackList);
    assert_eq!(t1.status, TaskStatus::Pending);

    let deployment = f
        .app
        .tracker
        .create_deployment(
            "web",
            DeploymentType::Stack,
            "A1",
            serde_json::json!({}),
            Some(t1.id.clone()),
        )
        .await
        .unwrap();

    f.app
        .tasks
        .update_task_status(&t1.id, StatusReport::new(TaskStatus::Running))
        .await
        .unwrap();
    assert_eq!(
        f.app.tracker.get_deployment(&deployment.id).unwrap().status,
        DeploymentStatus::Running
    );

    let update = f
        .app
        .tasks
        .update_task_status(
            &t1.id,
            StatusReport::completed(serde_json::json!({"stacks": [{"name": "web"}]})),
        )
        .await
        .unwrap();
    assert_eq!(
        update.deployment.map(|d| d.status),
        Some(DeploymentStatus::Completed)
    );

    let outcome = assert_ok!(call.await.unwrap());
    match outcome {
        CallOutcome::Completed { task_id, result } => {
            assert_eq!(task_id, t1.id);
            let stacks = decode_stacks(&result);
            assert_eq!(stacks.len(), 1);
            assert_eq!(stacks[0].name, "web");
        }
        other => panic!("expected completion, got {:?}", other),
    }

    assert!(f.app.tasks.list_pending_tasks_for_agent("A1").unwrap().is_empty());
    let view = f.app.tracker.describe_deployment(&deployment.id).unwrap();
    assert_eq!(view.task_status, Some(TaskStatus::Completed));
    assert!(view.deployment.error.is_none());
}

#[tokio::test]
async fn test_update_stack_waits_for_agent() {
    let f = patient_fleet();
    register(&f, "A1", "host1").await;

    let actions = f.app.actions.clone();
    let options = f.app.rpc.defaults();
    let update = tokio::spawn(async move { actions.update_stack("A1", "web", options).await });

    let task = next_pending(&f, "A1").await;
    assert_eq!(task.task_type, TaskType::StackUpdate);
    assert_eq!(task.payload["name"], "web");

    f.app
        .tasks
        .update_task_status(&task.id, StatusReport::failed("pull access denied"))
        .await
        .unwrap();

    let result = assert_ok!(update.await.unwrap());
    assert_eq!(
        result.outcome,
        CallOutcome::Failed {
            task_id: task.id.clone(),
            error: "pull access denied".to_string(),
        }
    );
    assert_eq!(result.deployment.status, DeploymentStatus::Failed);
    assert_eq!(result.deployment.error.as_deref(), Some("pull access denied"));
}
