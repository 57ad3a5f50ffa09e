use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use issue_pilot::config::{load_config, parse_agent_cli, validate, AgentCli, PilotConfig};

#[test]
fn test_defaults_match_reference_timings() {
    let config = PilotConfig::default();
    assert_eq!(config.execution.poll_interval(), Duration::from_secs(1));
    assert_eq!(config.execution.settle_delay(), Duration::from_millis(500));
    assert_eq!(config.execution.task_timeout(), Duration::from_secs(1800));
    assert_eq!(config.execution.max_hook_attempts, 3);
    assert_eq!(
        config.execution.decision_timeout(),
        Duration::from_secs(300)
    );
    assert_eq!(config.project.workdir, ".");
    assert_eq!(config.agent.cli, AgentCli::Claude);
    assert_eq!(config.agent.model, None);
}

#[test]
fn test_load_config_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config(dir.path()).unwrap();
    assert_eq!(config, PilotConfig::default());
}

#[test]
fn test_load_config_parses_full_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("issue-pilot.toml"),
        r#"
[project]
workdir = "work"

[agent]
cli = "codex"
model = "gpt-5"

[execution]
poll_interval_seconds = 2
settle_delay_ms = 250
task_timeout_minutes = 10
max_hook_attempts = 5
decision_timeout_minutes = 1
"#,
    )
    .unwrap();

    let config = load_config(dir.path()).unwrap();
    assert_eq!(config.project.workdir, "work");
    assert_eq!(config.agent.cli, AgentCli::Codex);
    assert_eq!(config.agent.model.as_deref(), Some("gpt-5"));
    assert_eq!(config.execution.poll_interval(), Duration::from_secs(2));
    assert_eq!(config.execution.settle_delay(), Duration::from_millis(250));
    assert_eq!(config.execution.max_hook_attempts, 5);
}

#[test]
fn test_load_config_partial_file_keeps_section_defaults() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("issue-pilot.toml"),
        "[execution]\ntask_timeout_minutes = 5\n",
    )
    .unwrap();

    let config = load_config(dir.path()).unwrap();
    assert_eq!(config.execution.task_timeout(), Duration::from_secs(300));
    // Untouched fields keep their defaults
    assert_eq!(config.execution.poll_interval_seconds, 1);
    assert_eq!(config.project.workdir, ".");
}

#[test]
fn test_load_config_rejects_bad_toml() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("issue-pilot.toml"), "not [valid toml").unwrap();
    assert!(load_config(dir.path()).is_err());
}

#[test]
fn test_validate_collects_all_errors() {
    let mut config = PilotConfig::default();
    config.execution.poll_interval_seconds = 0;
    config.execution.task_timeout_minutes = 0;
    config.execution.max_hook_attempts = 0;
    config.execution.decision_timeout_minutes = 0;
    config.project.workdir = String::new();

    let errors = validate(&config).unwrap_err();
    assert_eq!(errors.len(), 5);
    assert!(errors.iter().any(|e| e.contains("poll_interval_seconds")));
    assert!(errors.iter().any(|e| e.contains("workdir")));
}

#[test]
fn test_load_config_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("issue-pilot.toml"),
        "[execution]\nmax_hook_attempts = 0\n",
    )
    .unwrap();

    let err = load_config(dir.path()).unwrap_err();
    assert!(err.contains("max_hook_attempts"));
}

#[test]
fn test_parse_agent_cli() {
    assert_eq!(parse_agent_cli("claude").unwrap(), AgentCli::Claude);
    assert_eq!(parse_agent_cli("CODEX").unwrap(), AgentCli::Codex);
    assert!(parse_agent_cli("copilot").is_err());
}

#[test]
fn test_agent_cli_metadata() {
    assert_eq!(AgentCli::Claude.binary_name(), "claude");
    assert!(AgentCli::Claude.print_flags().contains(&"--print"));
    assert_eq!(AgentCli::Codex.binary_name(), "codex");
}
