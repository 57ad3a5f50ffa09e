#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use issue_pilot::task::{LaunchPaths, Task};
use issue_pilot::watcher::PollingWatcher;

/// Creates a `Task` with launch paths pointing into `dir`.
///
/// The PID stays 0 (never launched) unless the caller records one.
pub fn make_task(dir: &Path, phase_label: &str, item_key: &str) -> Arc<Task> {
    let task = Task::new(phase_label, item_key);
    task.record_launch(0, launch_paths(dir, phase_label, item_key));
    task
}

pub fn launch_paths(dir: &Path, phase_label: &str, item_key: &str) -> LaunchPaths {
    let base = format!("{}_{}", phase_label, item_key);
    LaunchPaths {
        script_path: dir.join(format!("{}.sh", base)),
        log_path: dir.join(format!("{}.log", base)),
        output_path: dir.join(format!("{}.out.md", base)),
    }
}

/// A watcher with intervals small enough for tests to finish quickly.
pub fn fast_watcher() -> PollingWatcher {
    PollingWatcher::new(
        Duration::from_millis(20),
        Duration::from_millis(20),
        Duration::from_secs(30),
    )
}

/// Spawn a genuinely detached process (re-parented to init, no wait handle
/// held anywhere in this test process) and return its PID.
///
/// The command runs under `nohup sh -c`, mirroring how the production
/// launcher detaches workers.
pub fn spawn_detached(command: &str) -> i32 {
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg(format!(
            "nohup sh -c '{}' >/dev/null 2>&1 & echo $!",
            command
        ))
        .output()
        .expect("failed to spawn detached command");
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .expect("detached spawn did not print a pid")
}

/// A PID that is guaranteed dead: spawn a trivial process and reap it.
pub fn dead_pid() -> i32 {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("failed to spawn");
    let pid = child.id() as i32;
    child.wait().expect("failed to wait");
    pid
}

/// Write a file, creating parent directories as needed.
pub fn write_file(path: &PathBuf, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create parent dir");
    }
    std::fs::write(path, contents).expect("failed to write file");
}

/// A log ending in the launcher's exit-code sentinel.
pub fn log_with_sentinel(body: &str, code: i32) -> String {
    format!("{}\nClaude exited with code: {}\n", body, code)
}
