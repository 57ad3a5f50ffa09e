mod common;

use tempfile::TempDir;

use issue_pilot::registry::{
    cancel_all_in_flight, deregister_task, in_flight_tasks, is_pid_alive, kill_task,
    register_task, request_cancel,
};
use issue_pilot::task::Task;

use common::{launch_paths, spawn_detached};

/// The registry is process-global, so its stateful behaviors are exercised
/// in one sequential test — parallel test threads would race each other
/// through `cancel_all_in_flight`.
#[tokio::test]
async fn test_registry_lifecycle_cancel_and_cancel_all() {
    let dir = TempDir::new().unwrap();

    // Register / deregister round trip
    let task = Task::new("plan", "REG-1");
    register_task(&task);
    assert!(in_flight_tasks().iter().any(|t| t.id() == "plan:REG-1"));
    deregister_task(task.id());
    assert!(!in_flight_tasks().iter().any(|t| t.id() == "plan:REG-1"));

    // request_cancel sets the flag without killing anything
    let task = Task::new("plan", "REG-2");
    register_task(&task);
    assert!(!task.cancel_requested());
    assert!(request_cancel("plan:REG-2"));
    assert!(task.cancel_requested());
    deregister_task(task.id());

    // Unknown ids are a no-op
    assert!(!request_cancel("plan:REG-NOPE"));

    // cancel_all flags and kills everything in flight
    let pid_a = spawn_detached("sleep 30");
    let pid_b = spawn_detached("sleep 30");
    let task_a = Task::new("plan", "REG-3A");
    task_a.record_launch(pid_a, launch_paths(dir.path(), "plan", "REG-3A"));
    let task_b = Task::new("plan", "REG-3B");
    task_b.record_launch(pid_b, launch_paths(dir.path(), "plan", "REG-3B"));
    register_task(&task_a);
    register_task(&task_b);

    cancel_all_in_flight().await;

    assert!(task_a.cancel_requested());
    assert!(task_b.cancel_requested());
    assert!(!is_pid_alive(pid_a));
    assert!(!is_pid_alive(pid_b));

    deregister_task(task_a.id());
    deregister_task(task_b.id());
}

#[tokio::test]
async fn test_kill_task_terminates_live_process() {
    let dir = TempDir::new().unwrap();
    let pid = spawn_detached("sleep 30");
    let task = Task::new("plan", "REG-KILL-1");
    task.record_launch(pid, launch_paths(dir.path(), "plan", "REG-KILL-1"));

    assert!(is_pid_alive(pid));
    kill_task(&task).await;
    assert!(!is_pid_alive(pid));
}

#[tokio::test]
async fn test_kill_task_on_dead_process_is_harmless() {
    let dir = TempDir::new().unwrap();
    let task = Task::new("plan", "REG-KILL-2");
    task.record_launch(
        common::dead_pid(),
        launch_paths(dir.path(), "plan", "REG-KILL-2"),
    );
    kill_task(&task).await;
}
