use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PilotError;
use crate::log_debug;
use crate::logscan;
use crate::registry;
use crate::task::{Task, TaskOutcome};

/// Strategy trait for discovering a detached process's completion.
///
/// The production implementation polls; the seam exists so alternative
/// signaling (a filesystem watch, a completion socket) could replace
/// polling without touching the runner.
pub trait CompletionWatch: Send + Sync {
    fn watch(
        &self,
        task: &Arc<Task>,
    ) -> impl std::future::Future<Output = TaskOutcome> + Send;
}

/// Poll-based completion watcher.
///
/// Per tick: cancellation first (it dominates every other check), then a
/// signal-0 liveness probe, then the wall-clock deadline. Once the process
/// has exited, a short settle delay lets it finish flushing output before
/// artifacts are inspected — without it there is a race between process
/// exit and the final file writes.
pub struct PollingWatcher {
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub deadline: Duration,
}

impl Default for PollingWatcher {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_millis(500),
            deadline: Duration::from_secs(30 * 60),
        }
    }
}

impl PollingWatcher {
    pub fn new(poll_interval: Duration, settle_delay: Duration, deadline: Duration) -> Self {
        Self {
            poll_interval,
            settle_delay,
            deadline,
        }
    }

    /// Classify a task whose process has exited, from its artifacts alone.
    async fn classify(&self, task: &Arc<Task>) -> TaskOutcome {
        let Some(paths) = task.paths() else {
            return TaskOutcome::Failed(PilotError::Launch(
                "task has no recorded launch paths".to_string(),
            ));
        };

        let log_text = tokio::fs::read_to_string(&paths.log_path)
            .await
            .unwrap_or_default();

        // Output artifact must exist and be readable, regardless of what the
        // log claims
        if let Err(e) = tokio::fs::read(&paths.output_path).await {
            let mined = logscan::mine_failure_reason(&log_text);
            let reason = if mined.is_empty() {
                e.to_string()
            } else {
                mined
            };
            return TaskOutcome::Failed(PilotError::ArtifactMissing {
                path: paths.output_path.clone(),
                reason,
            });
        }

        // A non-zero sentinel fails the task even though the artifact exists
        if let Some(code) = logscan::parse_exit_code(&log_text) {
            if code != 0 {
                let mined = logscan::mine_failure_reason(&log_text);
                let reason = if mined.is_empty() {
                    "see agent log".to_string()
                } else {
                    mined
                };
                return TaskOutcome::Failed(PilotError::NonZeroExit { code, reason });
            }
        }

        TaskOutcome::Success {
            output_path: paths.output_path,
        }
    }
}

impl CompletionWatch for PollingWatcher {
    async fn watch(&self, task: &Arc<Task>) -> TaskOutcome {
        let started = Instant::now();

        loop {
            if task.cancel_requested() {
                log_debug!("[watch] {} cancel requested, killing", task.id());
                registry::kill_task(task).await;
                return TaskOutcome::Cancelled;
            }

            if registry::is_pid_alive(task.pid()) {
                if started.elapsed() >= self.deadline {
                    log_debug!(
                        "[watch] {} exceeded deadline of {:?}, killing",
                        task.id(),
                        self.deadline
                    );
                    registry::kill_task(task).await;
                    return TaskOutcome::Failed(PilotError::TimedOut(self.deadline));
                }
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            break;
        }

        // Process exited — let it finish flushing before reading artifacts
        tokio::time::sleep(self.settle_delay).await;

        // Cancellation still wins if it raced the natural exit
        if task.cancel_requested() {
            return TaskOutcome::Cancelled;
        }

        self.classify(task).await
    }
}

/// Mock watcher for runner tests: returns predefined outcomes in sequence.
pub struct MockWatcher {
    outcomes: tokio::sync::Mutex<Vec<TaskOutcome>>,
}

impl MockWatcher {
    pub fn new(outcomes: Vec<TaskOutcome>) -> Self {
        let mut reversed = outcomes;
        reversed.reverse();
        Self {
            outcomes: tokio::sync::Mutex::new(reversed),
        }
    }
}

impl CompletionWatch for MockWatcher {
    async fn watch(&self, _task: &Arc<Task>) -> TaskOutcome {
        let mut outcomes = self.outcomes.lock().await;
        outcomes.pop().unwrap_or_else(|| {
            TaskOutcome::Failed(PilotError::Launch(
                "MockWatcher: no more outcomes in sequence".to_string(),
            ))
        })
    }
}
