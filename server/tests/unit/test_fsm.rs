//! Task status machine tests

use dockfleet::clock::Clock;
use dockfleet::errors::FleetError;
use dockfleet::models::task::{TaskStatus, TaskType};
use dockfleet::tasks::fsm::{transition, StatusReport, Transition, MISSING_ERROR_MESSAGE};

use crate::common::{fleet, register};

#[test]
fn test_transition_table() {
    use TaskStatus::*;

    let all = [Pending, Running, Completed, Failed];
    for from in all {
        for to in all {
            let expected = if from == to {
                Some(Transition::Unchanged)
            } else {
                match (from, to) {
                    (Pending, Running | Completed | Failed) => Some(Transition::Applied),
                    (Running, Completed | Failed) => Some(Transition::Applied),
                    _ => None,
                }
            };
            assert_eq!(transition(from, to), expected, "{} -> {}", from, to);
        }
    }
}

#[tokio::test]
async fn test_running_then_completed_sets_timestamps() {
    let f = fleet();
    register(&f, "A1", "host1").await;
    let task = f.app.tasks.send_task("A1", TaskType::ComposeUp, serde_json::json!({})).await.unwrap();

    f.clock.advance(chrono::Duration::seconds(2));
    let running = f
        .app
        .tasks
        .update_task_status(&task.id, StatusReport::new(TaskStatus::Running))
        .await
        .unwrap();
    assert_eq!(running.task.started_at, Some(f.app.clock.now()));
    assert!(running.task.completed_at.is_none());

    f.clock.advance(chrono::Duration::seconds(3));
    let done = f
        .app
        .tasks
        .update_task_status(&task.id, StatusReport::completed(serde_json::json!({"ok": true})))
        .await
        .unwrap();
    assert_eq!(done.task.started_at, running.task.started_at);
    assert_eq!(done.task.completed_at, Some(f.app.clock.now()));
    assert_eq!(done.task.result, Some(serde_json::json!({"ok": true})));
}

#[tokio::test]
async fn test_failure_without_message_gets_default() {
    let f = fleet();
    register(&f, "A1", "host1").await;
    let task = f.app.tasks.send_task("A1", TaskType::ImagePull, serde_json::json!({})).await.unwrap();

    let update = f
        .app
        .tasks
        .update_task_status(&task.id, StatusReport::new(TaskStatus::Failed))
        .await
        .unwrap();
    assert_eq!(update.task.error.as_deref(), Some(MISSING_ERROR_MESSAGE));
    assert!(update.task.result.is_none());
}

#[tokio::test]
async fn test_reset_to_pending_is_rejected() {
    let f = fleet();
    register(&f, "A1", "host1").await;
    let task = f.app.tasks.send_task("A1", TaskType::StackList, serde_json::json!({})).await.unwrap();
    f.app
        .tasks
        .update_task_status(&task.id, StatusReport::new(TaskStatus::Running))
        .await
        .unwrap();

    let result = f
        .app
        .tasks
        .update_task_status(&task.id, StatusReport::new(TaskStatus::Pending))
        .await;
    assert!(matches!(
        result,
        Err(FleetError::InvalidTransition {
            from: TaskStatus::Running,
            to: TaskStatus::Pending,
            ..
        })
    ));
    assert_eq!(f.app.tasks.get_task(&task.id).unwrap().status, TaskStatus::Running);
}
