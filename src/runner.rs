use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinSet;

use crate::error::PilotError;
use crate::events::{Event, EventBus, EventType};
use crate::launcher::{LaunchRequest, ProcessLauncher};
use crate::phase::ProcessPhase;
use crate::registry;
use crate::retry::{DecisionProvider, RetryGate};
use crate::store::{RecordStore, ResultStatus};
use crate::task::{Queue, Task, TaskOutcome};
use crate::watcher::CompletionWatch;
use crate::{log_debug, log_info};

/// One unit of work handed to a lane or batch: which issue, and the full
/// agent prompt for it.
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub item_key: String,
    pub prompt: String,
}

/// A lane's identity: its label (becomes the task id prefix and event lane)
/// and the phases it reports while active and on per-item success.
#[derive(Clone, Debug)]
pub struct LaneSpec {
    pub label: String,
    pub active_phase: ProcessPhase,
    pub success_phase: ProcessPhase,
}

impl LaneSpec {
    /// The plan-generation lane.
    pub fn plan() -> Self {
        Self {
            label: "plan".to_string(),
            active_phase: ProcessPhase::PlanGenerating,
            success_phase: ProcessPhase::PlanReady,
        }
    }

    /// The plan-execution lane.
    pub fn exec() -> Self {
        Self {
            label: "exec".to_string(),
            active_phase: ProcessPhase::PlanExecuting,
            success_phase: ProcessPhase::Completed,
        }
    }
}

/// Aggregate result of a drained lane or batch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub overall: ProcessPhase,
    pub message: String,
}

/// Per-run outcome tally, kept separate from the queue's whole-history
/// buckets so repeated runs against one queue aggregate correctly.
#[derive(Default, Debug, Clone, Copy)]
struct OutcomeCounts {
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

impl OutcomeCounts {
    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Success { .. } => self.succeeded += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
    }

    fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

/// Execution driver: launches tasks, awaits the watcher, decides
/// retry-vs-terminal through the gate, and records outcomes.
///
/// This is the single seam that talks to the `RecordStore` and the
/// `EventBus` — launch and watch layers below it return typed outcomes and
/// never persist or publish anything, which keeps "what happened" and
/// "what was recorded" consistent in one place.
pub struct QueueRunner<L, W, S, D>
where
    L: ProcessLauncher,
    W: CompletionWatch,
    S: RecordStore,
    D: DecisionProvider,
{
    launcher: Arc<L>,
    watcher: Arc<W>,
    store: Arc<S>,
    decisions: Arc<D>,
    bus: EventBus,
    gate: RetryGate,
    workdir: PathBuf,
}

impl<L, W, S, D> Clone for QueueRunner<L, W, S, D>
where
    L: ProcessLauncher,
    W: CompletionWatch,
    S: RecordStore,
    D: DecisionProvider,
{
    fn clone(&self) -> Self {
        Self {
            launcher: Arc::clone(&self.launcher),
            watcher: Arc::clone(&self.watcher),
            store: Arc::clone(&self.store),
            decisions: Arc::clone(&self.decisions),
            bus: self.bus.clone(),
            gate: self.gate.clone(),
            workdir: self.workdir.clone(),
        }
    }
}

impl<L, W, S, D> QueueRunner<L, W, S, D>
where
    L: ProcessLauncher + 'static,
    W: CompletionWatch + 'static,
    S: RecordStore + 'static,
    D: DecisionProvider + 'static,
{
    pub fn new(
        launcher: Arc<L>,
        watcher: Arc<W>,
        store: Arc<S>,
        decisions: Arc<D>,
        bus: EventBus,
        gate: RetryGate,
        workdir: PathBuf,
    ) -> Self {
        Self {
            launcher,
            watcher,
            store,
            decisions,
            bus,
            gate,
            workdir,
        }
    }

    /// Sequential lane: pulls one task at a time and runs it to a terminal
    /// outcome before pulling the next. Independent lanes may run
    /// concurrently with each other; within one lane the queue's single
    /// `current` slot enforces strict serialization.
    pub async fn run_lane(
        &self,
        queue: &Arc<Queue>,
        lane: &LaneSpec,
        jobs: Vec<JobSpec>,
    ) -> LaneSummary {
        let mut prompts: HashMap<String, String> = HashMap::new();
        let item_keys: Vec<String> = jobs.iter().map(|j| j.item_key.clone()).collect();
        for job in jobs {
            let task = Task::new(&lane.label, &job.item_key);
            prompts.insert(task.id().to_string(), job.prompt);
            queue.enqueue(task);
        }

        self.publish_lane_start(lane, &item_keys);

        let total = item_keys.len();
        let mut counts = OutcomeCounts::default();
        while let Some(task) = queue.take_next() {
            let outcome = if task.cancel_requested() {
                TaskOutcome::Cancelled
            } else {
                match prompts.get(task.id()) {
                    Some(prompt) => self.run_task(&task, prompt).await,
                    None => TaskOutcome::Failed(PilotError::Launch(format!(
                        "no prompt recorded for task {}",
                        task.id()
                    ))),
                }
            };
            self.finalize(queue, lane, &task, &outcome).await;
            counts.record(&outcome);
            self.publish_progress(lane, counts.total(), total);
        }

        self.aggregate(lane, counts)
    }

    /// Parallel batch: launches every job concurrently and fans outcomes in
    /// through a `JoinSet`. No ordering exists between items; the aggregate
    /// event fires only after every per-item task has reported.
    ///
    /// The batch reports `Failed` only when all items failed — partial
    /// success is `Completed` with the failure count in the message.
    pub async fn run_batch(
        &self,
        queue: &Arc<Queue>,
        lane: &LaneSpec,
        jobs: Vec<JobSpec>,
    ) -> LaneSummary {
        let item_keys: Vec<String> = jobs.iter().map(|j| j.item_key.clone()).collect();
        self.publish_lane_start(lane, &item_keys);

        let total = jobs.len();
        let mut join_set: JoinSet<TaskOutcome> = JoinSet::new();
        for job in jobs {
            let task = Task::new(&lane.label, &job.item_key);
            queue.admit(Arc::clone(&task));

            let runner = self.clone();
            let queue = Arc::clone(queue);
            let lane = lane.clone();
            join_set.spawn(async move {
                let outcome = if task.cancel_requested() {
                    TaskOutcome::Cancelled
                } else {
                    runner.run_task(&task, &job.prompt).await
                };
                runner.finalize(&queue, &lane, &task, &outcome).await;
                outcome
            });
        }

        let mut counts = OutcomeCounts::default();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(outcome) => counts.record(&outcome),
                Err(e) => {
                    log_debug!("Batch task join error: {}", e);
                    counts.failed += 1;
                }
            }
            self.publish_progress(lane, counts.total(), total);
        }

        self.aggregate(lane, counts)
    }

    /// Run one task to a terminal outcome, relaunching from scratch (new
    /// process, new PID and paths) when the gate approves a hook retry.
    async fn run_task(&self, task: &Arc<Task>, prompt: &str) -> TaskOutcome {
        let mut attempt: u32 = 1;

        loop {
            if task.cancel_requested() {
                return TaskOutcome::Cancelled;
            }

            log_info!(
                "[{}][{}] Starting attempt {}/{}",
                task.item_key(),
                task.phase_label().to_uppercase(),
                attempt,
                self.gate.max_attempts
            );

            let request = LaunchRequest {
                task_id: task.id(),
                item_key: task.item_key(),
                phase_label: task.phase_label(),
                prompt,
                workdir: &self.workdir,
            };

            let error = match self.launcher.launch(&request).await {
                Ok(info) => {
                    task.record_launch(info.pid, info.paths);
                    registry::register_task(task);
                    let outcome = self.watcher.watch(task).await;
                    registry::deregister_task(task.id());
                    task.clear_pid();

                    match outcome {
                        TaskOutcome::Failed(err) => err,
                        terminal => return terminal,
                    }
                }
                Err(err) => err.reclassify_hook(),
            };

            if self
                .gate
                .should_retry(
                    self.decisions.as_ref(),
                    task.item_key(),
                    task.phase_label(),
                    &error,
                    attempt,
                )
                .await
            {
                attempt += 1;
                log_info!(
                    "[{}][{}] Retrying after hook error: {}",
                    task.item_key(),
                    task.phase_label().to_uppercase(),
                    error
                );
                continue;
            }

            return TaskOutcome::Failed(error);
        }
    }

    /// Record a terminal outcome: move the task into its queue bucket,
    /// write the store exactly once, publish the per-item event.
    async fn finalize(
        &self,
        queue: &Arc<Queue>,
        lane: &LaneSpec,
        task: &Arc<Task>,
        outcome: &TaskOutcome,
    ) {
        queue.finish(task, outcome);

        match outcome {
            TaskOutcome::Success { output_path } => {
                self.persist(
                    task,
                    lane.success_phase,
                    Some(output_path.clone()),
                    ResultStatus::Completed,
                )
                .await;
                self.bus.publish(Event::new(
                    EventType::JobCompleted,
                    &lane.label,
                    json!({
                        "item_key": task.item_key(),
                        "task_id": task.id(),
                        "output_path": output_path.display().to_string(),
                    }),
                ));
                log_info!(
                    "[{}][{}] Completed: {}",
                    task.item_key(),
                    task.phase_label().to_uppercase(),
                    output_path.display()
                );
            }
            TaskOutcome::Failed(err) => {
                self.persist(task, ProcessPhase::Failed, None, ResultStatus::Failed)
                    .await;
                self.bus.publish(Event::new(
                    EventType::JobFailed,
                    &lane.label,
                    json!({
                        "item_key": task.item_key(),
                        "task_id": task.id(),
                        "status": "failed",
                        "error": err.to_string(),
                    }),
                ));
                log_info!(
                    "[{}][{}] Failed: {}",
                    task.item_key(),
                    task.phase_label().to_uppercase(),
                    err
                );
            }
            TaskOutcome::Cancelled => {
                // Cancellation resets the item rather than failing it, so
                // history never conflates the two
                self.persist(task, ProcessPhase::Idle, None, ResultStatus::Cancelled)
                    .await;
                self.bus.publish(Event::new(
                    EventType::JobFailed,
                    &lane.label,
                    json!({
                        "item_key": task.item_key(),
                        "task_id": task.id(),
                        "status": "cancelled",
                    }),
                ));
                log_info!(
                    "[{}][{}] Cancelled",
                    task.item_key(),
                    task.phase_label().to_uppercase()
                );
            }
        }
    }

    async fn persist(
        &self,
        task: &Arc<Task>,
        phase: ProcessPhase,
        output_path: Option<PathBuf>,
        status: ResultStatus,
    ) {
        if let Err(e) = self.store.update_phase(task.item_key(), phase).await {
            crate::log_warn!(
                "Warning: failed to persist phase for {}: {}",
                task.item_key(),
                e
            );
        }
        if let Err(e) = self
            .store
            .create_result(
                task.item_key(),
                task.phase_label(),
                output_path.as_deref(),
                status,
            )
            .await
        {
            crate::log_warn!(
                "Warning: failed to persist result for {}: {}",
                task.item_key(),
                e
            );
        }
    }

    fn publish_lane_start(&self, lane: &LaneSpec, item_keys: &[String]) {
        self.bus.publish_sync(Event::new(
            EventType::PhaseChange,
            &lane.label,
            json!({
                "item_keys": item_keys,
                "phase": lane.active_phase.display_name(),
                "progress": lane.active_phase.progress(),
            }),
        ));
    }

    fn publish_progress(&self, lane: &LaneSpec, done: usize, total: usize) {
        self.bus.publish(Event::new(
            EventType::ProgressUpdate,
            &lane.label,
            json!({ "done": done, "total": total }),
        ));
    }

    /// Build and publish the aggregate outcome once a lane or batch drains.
    ///
    /// `Failed` only when every item failed — partial success stays
    /// `Completed`, with the failure count visible in the message.
    fn aggregate(&self, lane: &LaneSpec, counts: OutcomeCounts) -> LaneSummary {
        let OutcomeCounts {
            succeeded,
            failed,
            cancelled,
        } = counts;

        let overall = if failed > 0 && succeeded == 0 && cancelled == 0 {
            ProcessPhase::Failed
        } else {
            ProcessPhase::Completed
        };
        let message = format!("{} succeeded, {} failed", succeeded, failed);

        self.bus.publish_sync(Event::new(
            EventType::PhaseChange,
            &lane.label,
            json!({
                "phase": overall.display_name(),
                "progress": overall.progress(),
                "message": message,
                "succeeded": succeeded,
                "failed": failed,
                "cancelled": cancelled,
            }),
        ));

        LaneSummary {
            succeeded,
            failed,
            cancelled,
            overall,
            message,
        }
    }

    /// Stop everything: clear pending work (never spawned), then cancel and
    /// kill every in-flight task via the registry.
    pub async fn cancel_all(&self, queues: &[Arc<Queue>]) {
        for queue in queues {
            let cleared = queue.clear_pending();
            if !cleared.is_empty() {
                log_info!("Cleared {} pending task(s)", cleared.len());
            }
        }
        registry::cancel_all_in_flight().await;
    }
}
