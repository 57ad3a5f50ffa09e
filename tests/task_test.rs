mod common;

use std::path::PathBuf;

use tempfile::TempDir;

use issue_pilot::error::PilotError;
use issue_pilot::task::{Bucket, Queue, Task, TaskOutcome};

fn success() -> TaskOutcome {
    TaskOutcome::Success {
        output_path: PathBuf::from("/tmp/out.md"),
    }
}

fn failure() -> TaskOutcome {
    TaskOutcome::Failed(PilotError::Launch("spawn failed".to_string()))
}

#[test]
fn test_task_id_combines_phase_and_item() {
    let task = Task::new("plan", "VID-42");
    assert_eq!(task.id(), "plan:VID-42");
    assert_eq!(task.item_key(), "VID-42");
    assert_eq!(task.phase_label(), "plan");
    assert_eq!(task.pid(), 0);
    assert!(!task.cancel_requested());
}

#[test]
fn test_record_launch_sets_linkage_and_clear_resets_pid() {
    let dir = TempDir::new().unwrap();
    let task = Task::new("plan", "TSK-1");
    let paths = common::launch_paths(dir.path(), "plan", "TSK-1");

    task.record_launch(4321, paths.clone());
    assert_eq!(task.pid(), 4321);
    assert_eq!(task.paths(), Some(paths));

    task.clear_pid();
    assert_eq!(task.pid(), 0);
    // Paths survive for history display
    assert!(task.paths().is_some());
}

#[test]
fn test_sequential_slot_blocks_second_take() {
    let queue = Queue::new();
    queue.enqueue(Task::new("plan", "TSK-2A"));
    queue.enqueue(Task::new("plan", "TSK-2B"));

    let first = queue.take_next().expect("first take should succeed");
    assert_eq!(first.id(), "plan:TSK-2A");

    // Lane is busy — nothing else comes out until the current task finishes
    assert!(queue.take_next().is_none());

    queue.finish(&first, &success());
    let second = queue.take_next().expect("second take after finish");
    assert_eq!(second.id(), "plan:TSK-2B");
}

#[test]
fn test_finish_routes_to_exactly_one_bucket() {
    let queue = Queue::new();
    let ok = Task::new("plan", "TSK-3A");
    let bad = Task::new("plan", "TSK-3B");
    let gone = Task::new("plan", "TSK-3C");
    for task in [&ok, &bad, &gone] {
        queue.enqueue(std::sync::Arc::clone(task));
    }

    let t = queue.take_next().unwrap();
    queue.finish(&t, &success());
    let t = queue.take_next().unwrap();
    queue.finish(&t, &failure());
    let t = queue.take_next().unwrap();
    queue.finish(&t, &TaskOutcome::Cancelled);

    assert_eq!(queue.bucket_of("plan:TSK-3A"), Some(Bucket::Completed));
    assert_eq!(queue.bucket_of("plan:TSK-3B"), Some(Bucket::Failed));
    assert_eq!(queue.bucket_of("plan:TSK-3C"), Some(Bucket::Cancelled));

    assert_eq!(queue.completed().len(), 1);
    assert_eq!(queue.failed().len(), 1);
    assert_eq!(queue.cancelled().len(), 1);
    assert!(queue.is_idle());
}

#[test]
fn test_double_finish_is_dropped() {
    let queue = Queue::new();
    let task = Task::new("plan", "TSK-4");
    queue.enqueue(std::sync::Arc::clone(&task));
    let t = queue.take_next().unwrap();

    queue.finish(&t, &success());
    // A late duplicate report must not move or double-count the task
    queue.finish(&t, &failure());

    assert_eq!(queue.bucket_of("plan:TSK-4"), Some(Bucket::Completed));
    assert_eq!(queue.completed().len(), 1);
    assert!(queue.failed().is_empty());
}

#[test]
fn test_admit_tracks_in_flight_without_current_slot() {
    let queue = Queue::new();
    let a = Task::new("plan", "TSK-5A");
    let b = Task::new("plan", "TSK-5B");
    queue.admit(std::sync::Arc::clone(&a));
    queue.admit(std::sync::Arc::clone(&b));
    assert!(!queue.is_idle());

    queue.finish(&a, &success());
    queue.finish(&b, &failure());
    assert!(queue.is_idle());
}

#[test]
fn test_clear_pending_cancels_unlaunched_work() {
    let queue = Queue::new();
    queue.enqueue(Task::new("plan", "TSK-6A"));
    queue.enqueue(Task::new("plan", "TSK-6B"));

    let cleared = queue.clear_pending();
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().all(|t| t.cancel_requested()));
    assert_eq!(queue.pending_len(), 0);
    assert_eq!(queue.cancelled().len(), 2);
    assert_eq!(queue.bucket_of("plan:TSK-6A"), Some(Bucket::Cancelled));
    assert!(queue.take_next().is_none());
}

#[test]
fn test_finished_tasks_carry_messages() {
    let queue = Queue::new();
    let task = Task::new("exec", "TSK-7");
    queue.enqueue(std::sync::Arc::clone(&task));
    let t = queue.take_next().unwrap();
    queue.finish(
        &t,
        &TaskOutcome::Failed(PilotError::NonZeroExit {
            code: 3,
            reason: "lint errors".to_string(),
        }),
    );

    let failed = queue.failed();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].message.contains("exit=3"));
    assert!(failed[0].message.contains("lint errors"));
}
