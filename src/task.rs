use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::PilotError;
use crate::log_warn;

/// Paths handed back by the process launcher after a spawn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchPaths {
    pub script_path: PathBuf,
    pub log_path: PathBuf,
    pub output_path: PathBuf,
}

/// One orchestrated invocation of an external agent process, bound to one
/// issue and one phase.
///
/// Shared across the launching task, the polling watcher, and UI-triggered
/// cancellation, so the mutable pieces are atomics plus a mutex for the
/// launch paths. PID stays 0 until launched and is reset on relaunch.
#[derive(Debug)]
pub struct Task {
    id: String,
    item_key: String,
    phase_label: String,
    pid: AtomicI32,
    cancel_requested: AtomicBool,
    paths: Mutex<Option<LaunchPaths>>,
}

impl Task {
    /// Task IDs are `"<phase_label>:<item_key>"` — unique per concurrently
    /// running invocation, since a lane runs at most one task per item+phase.
    pub fn new(phase_label: &str, item_key: &str) -> Arc<Task> {
        Arc::new(Task {
            id: format!("{}:{}", phase_label, item_key),
            item_key: item_key.to_string(),
            phase_label: phase_label.to_string(),
            pid: AtomicI32::new(0),
            cancel_requested: AtomicBool::new(false),
            paths: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn item_key(&self) -> &str {
        &self.item_key
    }

    pub fn phase_label(&self) -> &str {
        &self.phase_label
    }

    pub fn pid(&self) -> i32 {
        self.pid.load(Ordering::Relaxed)
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Relaxed)
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Relaxed);
    }

    /// Record the PID and paths of a fresh launch. Called once per attempt;
    /// a hook retry overwrites with the new process's identifiers.
    pub fn record_launch(&self, pid: i32, paths: LaunchPaths) {
        self.pid.store(pid, Ordering::Relaxed);
        *lock_paths(&self.paths) = Some(paths);
    }

    /// Clear process linkage after the attempt reached a terminal state.
    pub fn clear_pid(&self) {
        self.pid.store(0, Ordering::Relaxed);
    }

    pub fn paths(&self) -> Option<LaunchPaths> {
        lock_paths(&self.paths).clone()
    }
}

fn lock_paths<'a>(
    paths: &'a Mutex<Option<LaunchPaths>>,
) -> std::sync::MutexGuard<'a, Option<LaunchPaths>> {
    paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Terminal result of watching one task attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success { output_path: PathBuf },
    Failed(PilotError),
    Cancelled,
}

/// History entry for a task that reached a terminal state.
#[derive(Clone, Debug)]
pub struct FinishedTask {
    pub task: Arc<Task>,
    pub message: String,
    pub finished_at: DateTime<Utc>,
}

/// Which outcome bucket a finished task landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Arc<Task>>,
    current: Option<Arc<Task>>,
    in_flight: Vec<Arc<Task>>,
    completed: Vec<FinishedTask>,
    failed: Vec<FinishedTask>,
    cancelled: Vec<FinishedTask>,
}

/// Per-lane task queue: an ordered pending list, at most one `current` task
/// for sequential processing (or an unbounded in-flight set for batches),
/// and three append-only outcome buckets.
///
/// Mutated from the lane's runner task, per-item batch tasks, and
/// UI/signal-triggered cancellation, so every access goes through the inner
/// mutex. Critical sections are short and do no I/O.
#[derive(Default)]
pub struct Queue {
    state: Mutex<QueueState>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, task: Arc<Task>) {
        self.lock().pending.push_back(task);
    }

    /// Pull the next pending task into the lane's single `current` slot.
    /// Returns `None` while a task is still running — this is the lane's
    /// "not already running" guard.
    pub fn take_next(&self) -> Option<Arc<Task>> {
        let mut state = self.lock();
        if state.current.is_some() {
            return None;
        }
        let task = state.pending.pop_front()?;
        state.current = Some(Arc::clone(&task));
        Some(task)
    }

    /// Admit a batch item directly into the in-flight set, bypassing the
    /// sequential slot.
    pub fn admit(&self, task: Arc<Task>) {
        self.lock().in_flight.push(task);
    }

    /// Move a task from current/in-flight into exactly one outcome bucket.
    ///
    /// A task id is recorded at most once: a second finish call for the same
    /// id is dropped with a warning rather than double-counted.
    pub fn finish(&self, task: &Arc<Task>, outcome: &TaskOutcome) {
        let mut state = self.lock();

        if state
            .completed
            .iter()
            .chain(state.failed.iter())
            .chain(state.cancelled.iter())
            .any(|f| f.task.id() == task.id())
        {
            log_warn!("Warning: task {} already recorded, ignoring", task.id());
            return;
        }

        if state.current.as_ref().is_some_and(|c| c.id() == task.id()) {
            state.current = None;
        }
        state.in_flight.retain(|t| t.id() != task.id());

        let entry = FinishedTask {
            task: Arc::clone(task),
            message: outcome_message(outcome),
            finished_at: Utc::now(),
        };
        match outcome {
            TaskOutcome::Success { .. } => state.completed.push(entry),
            TaskOutcome::Failed(_) => state.failed.push(entry),
            TaskOutcome::Cancelled => state.cancelled.push(entry),
        }
    }

    /// Drop all not-yet-launched work. Used by cancel-all; pending tasks are
    /// never spawned, so they are recorded as cancelled here.
    pub fn clear_pending(&self) -> Vec<Arc<Task>> {
        let mut state = self.lock();
        let cleared: Vec<Arc<Task>> = state.pending.drain(..).collect();
        for task in &cleared {
            task.request_cancel();
            state.cancelled.push(FinishedTask {
                task: Arc::clone(task),
                message: "cancelled before launch".to_string(),
                finished_at: Utc::now(),
            });
        }
        cleared
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.current.is_none() && state.in_flight.is_empty()
    }

    /// Locate which outcome bucket (if any) recorded the given task id.
    pub fn bucket_of(&self, task_id: &str) -> Option<Bucket> {
        let state = self.lock();
        if state.completed.iter().any(|f| f.task.id() == task_id) {
            return Some(Bucket::Completed);
        }
        if state.failed.iter().any(|f| f.task.id() == task_id) {
            return Some(Bucket::Failed);
        }
        if state.cancelled.iter().any(|f| f.task.id() == task_id) {
            return Some(Bucket::Cancelled);
        }
        None
    }

    pub fn completed(&self) -> Vec<FinishedTask> {
        self.lock().completed.clone()
    }

    pub fn failed(&self) -> Vec<FinishedTask> {
        self.lock().failed.clone()
    }

    pub fn cancelled(&self) -> Vec<FinishedTask> {
        self.lock().cancelled.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn outcome_message(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Success { output_path } => {
            format!("completed: {}", output_path.display())
        }
        TaskOutcome::Failed(err) => err.to_string(),
        TaskOutcome::Cancelled => "cancelled".to_string(),
    }
}
