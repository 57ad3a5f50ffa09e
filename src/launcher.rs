use std::path::{Path, PathBuf};

use crate::config::AgentCli;
use crate::error::PilotError;
use crate::logscan::EXIT_CODE_MARKER;
use crate::task::LaunchPaths;
use crate::{log_debug, log_warn};

/// Everything the launcher needs to start one agent process.
pub struct LaunchRequest<'a> {
    pub task_id: &'a str,
    pub item_key: &'a str,
    pub phase_label: &'a str,
    /// Full prompt text, including the instruction to write the output
    /// artifact to `output_path`.
    pub prompt: &'a str,
    pub workdir: &'a Path,
}

/// Process linkage returned by a successful launch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchInfo {
    pub pid: i32,
    pub paths: LaunchPaths,
}

/// Trait for launching detached agent processes. Enables mocking in runner
/// tests.
///
/// Implementations must return immediately after the spawn — the launched
/// process outlives any wait handle, and completion is discovered by the
/// watcher polling liveness and artifacts. The captured log must end with
/// the sentinel line `"Claude exited with code: <integer>"` once the agent
/// exits.
pub trait ProcessLauncher: Send + Sync {
    fn launch(
        &self,
        req: &LaunchRequest<'_>,
    ) -> impl std::future::Future<Output = Result<LaunchInfo, PilotError>> + Send;
}

/// Production launcher: wraps the configured agent CLI in a generated
/// worker script and double-forks it loose.
///
/// The spawn is `sh -c 'nohup sh <worker> & echo $! > <pidfile>'` — the
/// intermediate shell exits immediately (and is reaped), the worker is
/// re-parented to init, and the recorded PID is pollable with a signal-0
/// probe without ever leaving a zombie behind. The worker script appends
/// the exit-code sentinel to the log as its last act, which is what lets
/// the watcher distinguish "killed mid-flight" from "exited on its own".
pub struct DetachedCliLauncher {
    pub cli: AgentCli,
    pub model: Option<String>,
}

impl DetachedCliLauncher {
    pub fn new(cli: AgentCli, model: Option<String>) -> Self {
        Self { cli, model }
    }

    /// Verify that the configured CLI tool is available on PATH.
    pub fn verify_cli_available(&self) -> Result<(), String> {
        let output = std::process::Command::new(self.cli.binary_name())
            .arg("--version")
            .output()
            .map_err(|e| {
                format!(
                    "{} not found on PATH. {} ({})",
                    self.cli.display_name(),
                    self.cli.install_hint(),
                    e
                )
            })?;

        if !output.status.success() {
            return Err(format!(
                "{} found but `{} --version` failed",
                self.cli.display_name(),
                self.cli.binary_name()
            ));
        }

        Ok(())
    }

    fn agent_invocation(&self, prompt_path: &Path) -> String {
        let mut cmd = format!(
            "'{}' {} \"$(cat '{}')\"",
            self.cli.binary_name(),
            self.cli.print_flags().join(" "),
            prompt_path.display()
        );
        if let Some(ref model) = self.model {
            cmd.push_str(&format!(" --model '{}'", model));
        }
        cmd
    }
}

/// Directory holding generated scripts, logs, and artifacts.
pub fn run_dir(workdir: &Path) -> PathBuf {
    workdir.join(".issue-pilot").join("run")
}

/// Where the launcher will place the output artifact for a task id.
/// Exposed so callers can hand the path to the agent prompt up front.
pub fn output_artifact_path(workdir: &Path, task_id: &str) -> PathBuf {
    run_dir(workdir).join(format!("{}.out.md", sanitize_task_id(task_id)))
}

impl ProcessLauncher for DetachedCliLauncher {
    async fn launch(&self, req: &LaunchRequest<'_>) -> Result<LaunchInfo, PilotError> {
        let run_dir = run_dir(req.workdir);
        tokio::fs::create_dir_all(&run_dir)
            .await
            .map_err(|e| PilotError::Launch(format!("failed to create run dir: {}", e)))?;

        let base = sanitize_task_id(req.task_id);
        let script_path = run_dir.join(format!("{}.sh", base));
        let log_path = run_dir.join(format!("{}.log", base));
        let output_path = output_artifact_path(req.workdir, req.task_id);
        let prompt_path = run_dir.join(format!("{}.prompt.md", base));
        let pid_path = run_dir.join(format!("{}.pid", base));

        // Delete stale artifacts from a previous attempt (unconditional to
        // avoid TOCTOU)
        remove_stale(&output_path).await?;
        remove_stale(&pid_path).await?;

        tokio::fs::write(&prompt_path, req.prompt)
            .await
            .map_err(|e| PilotError::Launch(format!("failed to write prompt file: {}", e)))?;

        let worker = format!(
            "#!/bin/sh\n\
             # issue-pilot worker: {phase} for {key}\n\
             {agent} >> '{log}' 2>&1 </dev/null\n\
             echo \"{marker}: $?\" >> '{log}'\n",
            phase = req.phase_label,
            key = req.item_key,
            agent = self.agent_invocation(&prompt_path),
            log = log_path.display(),
            marker = EXIT_CODE_MARKER,
        );
        write_executable(&script_path, &worker).await?;

        // Fresh log per attempt so sentinel mining never sees an old run
        tokio::fs::write(&log_path, "")
            .await
            .map_err(|e| PilotError::Launch(format!("failed to create log file: {}", e)))?;

        log_debug!("[launch] {} via {}", req.task_id, script_path.display());

        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(format!(
                "nohup /bin/sh '{}' >/dev/null 2>&1 & echo $! > '{}'",
                script_path.display(),
                pid_path.display()
            ))
            .stdin(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| PilotError::Launch(format!("failed to spawn worker: {}", e)))?;

        if !status.success() {
            return Err(PilotError::Launch(format!(
                "worker spawn exited with {:?}",
                status.code()
            )));
        }

        let pid_text = tokio::fs::read_to_string(&pid_path)
            .await
            .map_err(|e| PilotError::Launch(format!("failed to read pid file: {}", e)))?;
        let pid: i32 = pid_text
            .trim()
            .parse()
            .map_err(|_| PilotError::Launch(format!("bad pid file contents: {:?}", pid_text)))?;

        log_debug!("[launch] {} running (pid={})", req.task_id, pid);

        Ok(LaunchInfo {
            pid,
            paths: LaunchPaths {
                script_path,
                log_path,
                output_path,
            },
        })
    }
}

async fn remove_stale(path: &Path) -> Result<(), PilotError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log_warn!("Warning: stale file found at {}, deleted", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PilotError::Launch(format!(
            "failed to remove stale file {}: {}",
            path.display(),
            e
        ))),
    }
}

async fn write_executable(path: &Path, contents: &str) -> Result<(), PilotError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| PilotError::Launch(format!("failed to write {}: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| {
                PilotError::Launch(format!("failed to chmod {}: {}", path.display(), e))
            })?;
    }

    Ok(())
}

/// Task IDs contain `:`, which is unfriendly in filenames.
fn sanitize_task_id(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Mock launcher for runner tests.
///
/// Returns predefined launch results from a configurable sequence and
/// records the task ids it saw. Each call pops the next result.
pub struct MockLauncher {
    results: tokio::sync::Mutex<Vec<Result<LaunchInfo, PilotError>>>,
    calls: std::sync::Mutex<Vec<String>>,
}

impl MockLauncher {
    /// Results are returned in order (first call gets the first result).
    pub fn new(results: Vec<Result<LaunchInfo, PilotError>>) -> Self {
        let mut reversed = results;
        reversed.reverse();
        Self {
            results: tokio::sync::Mutex::new(reversed),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Task ids passed to `launch`, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ProcessLauncher for MockLauncher {
    async fn launch(&self, req: &LaunchRequest<'_>) -> Result<LaunchInfo, PilotError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(req.task_id.to_string());
        let mut results = self.results.lock().await;
        results.pop().unwrap_or_else(|| {
            Err(PilotError::Launch(
                "MockLauncher: no more results in sequence".to_string(),
            ))
        })
    }
}
