use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use issue_pilot::config;
use issue_pilot::events::{EventBus, EventType};
use issue_pilot::launcher::DetachedCliLauncher;
use issue_pilot::lock;
use issue_pilot::log::parse_log_level;
use issue_pilot::pipeline::{self, FileIssueSource, MarkdownRenderer, NoopMediaCollector};
use issue_pilot::registry::{install_signal_handlers, is_shutdown_requested};
use issue_pilot::retry::{RetryGate, StdinDecisionProvider};
use issue_pilot::runner::{JobSpec, LaneSpec, QueueRunner};
use issue_pilot::store::MemoryRecordStore;
use issue_pilot::task::Queue;
use issue_pilot::watcher::PollingWatcher;
use issue_pilot::{log_error, log_info};

#[derive(Parser)]
#[command(name = "issue-pilot", about = "Issue-to-plan workflow engine")]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Log verbosity level (error, warn, info, debug)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize issue-pilot directories and config
    Init,
    /// Run the full workflow for one issue: intake, plan, optionally execute
    Run {
        /// Issue key (e.g., VID-42)
        item_key: String,
        /// Also execute the generated plan
        #[arg(long)]
        execute: bool,
    },
    /// Generate plans for several issues as one concurrent batch
    Plan {
        /// Issue keys to plan
        #[arg(required = true)]
        item_keys: Vec<String>,
    },
    /// Execute a previously generated plan for one issue
    Exec {
        /// Issue key (e.g., VID-42)
        item_key: String,
        /// Plan file to execute (defaults to the plan lane's output artifact)
        #[arg(long)]
        plan: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match parse_log_level(&cli.log_level) {
        Ok(level) => issue_pilot::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Init => handle_init(&cli.root),
        Commands::Run { item_key, execute } => handle_run(&cli.root, &item_key, execute).await,
        Commands::Plan { item_keys } => handle_plan(&cli.root, item_keys).await,
        Commands::Exec { item_key, plan } => handle_exec(&cli.root, &item_key, plan).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn handle_init(root: &Path) -> Result<(), String> {
    for dir in [".issue-pilot", "issues"] {
        let dir_path = root.join(dir);
        fs::create_dir_all(&dir_path)
            .map_err(|e| format!("Failed to create {}: {}", dir_path.display(), e))?;
    }

    let config_path = root.join("issue-pilot.toml");
    if !config_path.exists() {
        let contents = r#"[project]
workdir = "."

[agent]
# cli = "claude"          # AI CLI tool: "claude", "codex"
# model = ""              # Model override (e.g., "opus", "sonnet")

[execution]
poll_interval_seconds = 1
settle_delay_ms = 500
task_timeout_minutes = 30
max_hook_attempts = 3
decision_timeout_minutes = 5
"#;
        fs::write(&config_path, contents)
            .map_err(|e| format!("Failed to write {}: {}", config_path.display(), e))?;
        log_info!("Created {}", config_path.display());
    } else {
        log_info!("{} already exists, leaving it alone", config_path.display());
    }

    Ok(())
}

/// Everything the lane-driving commands share: config-derived paths, the
/// instance lock, signal handlers, a wired runner, and a logging event
/// subscriber.
struct PilotContext {
    workdir: PathBuf,
    bus: EventBus,
    runner: QueueRunner<DetachedCliLauncher, PollingWatcher, MemoryRecordStore, StdinDecisionProvider>,
    store: Arc<MemoryRecordStore>,
    _lock: lock::LockGuard,
}

fn build_context(root: &Path) -> Result<PilotContext, String> {
    let config = config::load_config(root)?;
    let workdir = root.join(&config.project.workdir);
    let runtime_dir = workdir.join(".issue-pilot");

    let lock_guard = lock::try_acquire(&runtime_dir)?;
    install_signal_handlers()?;

    let launcher = DetachedCliLauncher::new(config.agent.cli, config.agent.model.clone());
    launcher.verify_cli_available()?;

    let watcher = PollingWatcher::new(
        config.execution.poll_interval(),
        config.execution.settle_delay(),
        config.execution.task_timeout(),
    );
    let gate = RetryGate::new(
        config.execution.max_hook_attempts,
        config.execution.decision_timeout(),
    );

    let bus = EventBus::new();
    bus.subscribe(EventType::PhaseChange, |event| {
        log_info!("[{}] {}", event.lane, event.data);
    });
    bus.subscribe(EventType::JobFailed, |event| {
        log_error!("[{}] {}", event.lane, event.data);
    });

    let store = Arc::new(MemoryRecordStore::new());
    let runner = QueueRunner::new(
        Arc::new(launcher),
        Arc::new(watcher),
        Arc::clone(&store),
        Arc::new(StdinDecisionProvider),
        bus.clone(),
        gate,
        workdir.clone(),
    );

    Ok(PilotContext {
        workdir,
        bus,
        runner,
        store,
        _lock: lock_guard,
    })
}

/// Watch the signal flag and cancel everything when shutdown is requested.
fn spawn_shutdown_watch(ctx: &PilotContext, queues: Vec<Arc<Queue>>) {
    let runner = ctx.runner.clone();
    tokio::spawn(async move {
        loop {
            if is_shutdown_requested() {
                log_info!("Shutdown requested — cancelling all tasks");
                runner.cancel_all(&queues).await;
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });
}

/// Intake one issue and return the rendered document text.
async fn intake_document(ctx: &PilotContext, root: &Path, item_key: &str) -> Result<String, String> {
    let source = FileIssueSource {
        root: root.join("issues"),
    };
    let doc_path = pipeline::run_intake(
        &source,
        &NoopMediaCollector,
        &MarkdownRenderer,
        ctx.store.as_ref(),
        &ctx.bus,
        item_key,
        &ctx.workdir,
    )
    .await?;
    tokio::fs::read_to_string(&doc_path)
        .await
        .map_err(|e| format!("Failed to read document {}: {}", doc_path.display(), e))
}

/// The plan lane writes its artifact at a fixed spot in the run dir.
fn plan_artifact_path(workdir: &Path, item_key: &str) -> PathBuf {
    issue_pilot::launcher::output_artifact_path(workdir, &format!("plan:{}", item_key))
}

async fn handle_run(root: &Path, item_key: &str, execute: bool) -> Result<(), String> {
    let ctx = build_context(root)?;

    let document = intake_document(&ctx, root, item_key).await?;

    let plan_queue = Arc::new(Queue::new());
    spawn_shutdown_watch(&ctx, vec![Arc::clone(&plan_queue)]);

    let lane = LaneSpec::plan();
    let out = plan_artifact_path(&ctx.workdir, item_key);
    let jobs = vec![JobSpec {
        item_key: item_key.to_string(),
        prompt: issue_pilot::prompt::build_plan_prompt(item_key, &document, &out),
    }];
    let summary = ctx.runner.run_lane(&plan_queue, &lane, jobs).await;
    log_info!("Plan lane: {}", summary.message);

    if summary.succeeded == 0 {
        return Err(format!("Plan generation failed for {}", item_key));
    }

    if execute {
        run_exec_lane(&ctx, item_key, &out).await?;
    }

    Ok(())
}

async fn handle_plan(root: &Path, item_keys: Vec<String>) -> Result<(), String> {
    let ctx = build_context(root)?;

    let mut jobs = Vec::new();
    for item_key in &item_keys {
        let document = intake_document(&ctx, root, item_key).await?;
        let out = plan_artifact_path(&ctx.workdir, item_key);
        jobs.push(JobSpec {
            item_key: item_key.clone(),
            prompt: issue_pilot::prompt::build_plan_prompt(item_key, &document, &out),
        });
    }

    let batch_queue = Arc::new(Queue::new());
    spawn_shutdown_watch(&ctx, vec![Arc::clone(&batch_queue)]);

    let summary = ctx
        .runner
        .run_batch(&batch_queue, &LaneSpec::plan(), jobs)
        .await;
    log_info!("Plan batch: {}", summary.message);

    if summary.overall == issue_pilot::phase::ProcessPhase::Failed {
        return Err(format!("All {} plan jobs failed", item_keys.len()));
    }
    Ok(())
}

async fn handle_exec(root: &Path, item_key: &str, plan: Option<PathBuf>) -> Result<(), String> {
    let ctx = build_context(root)?;

    let plan_path = plan.unwrap_or_else(|| plan_artifact_path(&ctx.workdir, item_key));
    run_exec_lane(&ctx, item_key, &plan_path).await
}

async fn run_exec_lane(ctx: &PilotContext, item_key: &str, plan_path: &Path) -> Result<(), String> {
    let plan_text = tokio::fs::read_to_string(plan_path)
        .await
        .map_err(|e| format!("Failed to read plan {}: {}", plan_path.display(), e))?;

    let exec_queue = Arc::new(Queue::new());
    spawn_shutdown_watch(ctx, vec![Arc::clone(&exec_queue)]);

    let lane = LaneSpec::exec();
    let out =
        issue_pilot::launcher::output_artifact_path(&ctx.workdir, &format!("exec:{}", item_key));
    let jobs = vec![JobSpec {
        item_key: item_key.to_string(),
        prompt: issue_pilot::prompt::build_execute_prompt(item_key, &plan_text, &out),
    }];

    let summary = ctx.runner.run_lane(&exec_queue, &lane, jobs).await;
    log_info!("Exec lane: {}", summary.message);

    if summary.succeeded == 0 {
        return Err(format!("Plan execution failed for {}", item_key));
    }
    Ok(())
}
