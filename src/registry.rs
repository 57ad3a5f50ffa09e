use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::task::Task;
use crate::{log_debug, log_warn};

/// Maximum time to wait for graceful shutdown after SIGTERM before falling
/// back to the pattern kill.
const SIGTERM_GRACE_PERIOD_SECONDS: u64 = 5;

/// Polling interval when waiting for a process to exit after SIGTERM.
const KILL_POLL_INTERVAL_MS: u64 = 100;

/// Global shutdown flag shared with signal handlers.
fn shutdown_flag() -> &'static Arc<AtomicBool> {
    static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)))
}

/// Check if a shutdown has been requested via signal.
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Install signal handlers for SIGTERM and SIGINT that set the shutdown flag.
///
/// Call once at program startup. Subsequent calls are safe (re-registers
/// handlers). The main loop observes the flag and drives `cancel_all`.
pub fn install_signal_handlers() -> Result<(), String> {
    let flag = Arc::clone(shutdown_flag());
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))
        .map_err(|e| format!("Failed to register SIGTERM handler: {}", e))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, flag)
        .map_err(|e| format!("Failed to register SIGINT handler: {}", e))?;
    Ok(())
}

// --- In-flight task registry ---

/// Process-wide map of currently in-flight tasks, keyed by task id.
///
/// Holds non-owning (well, `Arc`-shared) lookups only while a task is in
/// flight; entries are removed on terminal outcome so finished tasks are
/// not kept alive here. Uses `std::sync::Mutex` because operations are
/// fast (insert/remove/iterate) with no I/O under the lock.
fn task_registry() -> &'static Mutex<HashMap<String, Arc<Task>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<Task>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_registry() -> std::sync::MutexGuard<'static, HashMap<String, Arc<Task>>> {
    task_registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Register a task for the duration it is in flight.
pub fn register_task(task: &Arc<Task>) {
    lock_registry().insert(task.id().to_string(), Arc::clone(task));
}

/// Deregister on terminal outcome. Forgetting this leaks the entry until
/// process exit, so the runner calls it on every path out of a task.
pub fn deregister_task(task_id: &str) {
    lock_registry().remove(task_id);
}

/// Snapshot of every in-flight task.
pub fn in_flight_tasks() -> Vec<Arc<Task>> {
    lock_registry().values().cloned().collect()
}

/// Set the cancel flag on a matching in-flight task.
///
/// Does not kill anything itself — the watcher observes the flag on its
/// next poll tick. Returns false when no task with that id is in flight.
pub fn request_cancel(task_id: &str) -> bool {
    match lock_registry().get(task_id) {
        Some(task) => {
            task.request_cancel();
            true
        }
        None => false,
    }
}

/// Signal-0 probe: is the process with this PID still alive?
pub fn is_pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Kill a task's external process: SIGTERM by PID first, then — if it
/// survives the grace period — a pattern kill matching the absolute worker
/// script path. The pattern is always the absolute path; a relative one
/// could take down unrelated processes.
///
/// The blocking poll-and-sleep loop runs on the tokio blocking thread pool
/// via `spawn_blocking` to avoid stalling async worker threads.
pub async fn kill_task(task: &Arc<Task>) {
    let pid = task.pid();
    let script = task.paths().map(|p| p.script_path);

    let task_id = task.id().to_string();
    tokio::task::spawn_blocking(move || {
        if pid > 0 {
            if let Err(nix::errno::Errno::ESRCH) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                return; // already gone
            }

            let deadline =
                std::time::Instant::now() + Duration::from_secs(SIGTERM_GRACE_PERIOD_SECONDS);
            let poll_interval = Duration::from_millis(KILL_POLL_INTERVAL_MS);
            while std::time::Instant::now() < deadline {
                if !is_pid_alive(pid) {
                    return;
                }
                std::thread::sleep(poll_interval);
            }
        }

        // Still alive (or PID unknown) — pattern kill on the script path
        let Some(script) = script else {
            log_debug!("[kill] {} has no script path, nothing to match", task_id);
            return;
        };
        if !script.is_absolute() {
            log_warn!(
                "Warning: refusing pattern kill with relative path {}",
                script.display()
            );
            return;
        }
        let _ = std::process::Command::new("pkill")
            .arg("-9")
            .arg("-f")
            .arg(script.as_os_str())
            .status();
    })
    .await
    .unwrap_or_else(|e| log_warn!("kill_task worker panicked: {}", e));
}

/// Cancel and kill every in-flight task.
///
/// Pending (not-yet-launched) work lives in the queues, not here — callers
/// clear those separately without spawning them.
pub async fn cancel_all_in_flight() {
    let tasks = in_flight_tasks();
    if tasks.is_empty() {
        return;
    }
    log_debug!("[cancel] stopping {} in-flight task(s)", tasks.len());
    for task in &tasks {
        task.request_cancel();
    }
    for task in &tasks {
        kill_task(task).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_pid_alive_current_process() {
        let pid = std::process::id() as i32;
        assert!(is_pid_alive(pid));
    }

    #[test]
    fn test_is_pid_alive_nonexistent() {
        assert!(!is_pid_alive(99_999_999));
    }

    #[test]
    fn test_is_pid_alive_rejects_unlaunched() {
        // PID 0 means "not launched yet", never probe it as a real process
        assert!(!is_pid_alive(0));
        assert!(!is_pid_alive(-4));
    }
}
