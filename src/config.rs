use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PilotConfig {
    pub project: ProjectConfig,
    pub agent: AgentConfig,
    pub execution: ExecutionConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root for the `.issue-pilot/` runtime directory and generated
    /// documents.
    pub workdir: String,
}

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub cli: AgentCli,
    pub model: Option<String>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub poll_interval_seconds: u64,
    pub settle_delay_ms: u64,
    pub task_timeout_minutes: u32,
    /// Total launches allowed for a hook-failing task, first attempt
    /// included.
    pub max_hook_attempts: u32,
    pub decision_timeout_minutes: u32,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            workdir: ".".to_string(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 1,
            settle_delay_ms: 500,
            task_timeout_minutes: 30,
            max_hook_attempts: 3,
            decision_timeout_minutes: 5,
        }
    }
}

impl ExecutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_minutes as u64 * 60)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_secs(self.decision_timeout_minutes as u64 * 60)
    }
}

/// Which external agent CLI the launcher wraps.
#[derive(Default, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentCli {
    #[default]
    Claude,
    Codex,
}

impl AgentCli {
    pub fn binary_name(&self) -> &'static str {
        match self {
            AgentCli::Claude => "claude",
            AgentCli::Codex => "codex",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentCli::Claude => "Claude Code",
            AgentCli::Codex => "Codex CLI",
        }
    }

    pub fn install_hint(&self) -> &'static str {
        match self {
            AgentCli::Claude => "Install with: npm install -g @anthropic-ai/claude-code",
            AgentCli::Codex => "Install with: npm install -g @openai/codex",
        }
    }

    /// Flags for a one-shot, non-interactive prompt invocation.
    pub fn print_flags(&self) -> Vec<&'static str> {
        match self {
            AgentCli::Claude => vec!["--print", "--permission-mode", "bypassPermissions"],
            AgentCli::Codex => vec!["exec", "--skip-git-repo-check"],
        }
    }
}

pub fn parse_agent_cli(s: &str) -> Result<AgentCli, String> {
    match s.to_lowercase().as_str() {
        "claude" => Ok(AgentCli::Claude),
        "codex" => Ok(AgentCli::Codex),
        _ => Err(format!(
            "Invalid agent CLI '{}': expected claude or codex",
            s
        )),
    }
}

pub fn validate(config: &PilotConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.execution.poll_interval_seconds < 1 {
        errors.push("execution.poll_interval_seconds must be >= 1".to_string());
    }

    if config.execution.task_timeout_minutes < 1 {
        errors.push("execution.task_timeout_minutes must be >= 1".to_string());
    }

    if config.execution.max_hook_attempts < 1 {
        errors.push("execution.max_hook_attempts must be >= 1".to_string());
    }

    if config.execution.decision_timeout_minutes < 1 {
        errors.push("execution.decision_timeout_minutes must be >= 1".to_string());
    }

    if config.project.workdir.is_empty() {
        errors.push("project.workdir must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn load_config(project_root: &Path) -> Result<PilotConfig, String> {
    let config_path = project_root.join("issue-pilot.toml");

    if !config_path.exists() {
        return Ok(PilotConfig::default());
    }

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| format!("Failed to read {}: {}", config_path.display(), e))?;

    let config: PilotConfig = toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", config_path.display(), e))?;

    validate(&config).map_err(|errors| {
        format!(
            "Config validation failed:\n{}",
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;

    Ok(config)
}
