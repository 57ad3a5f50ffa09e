use std::path::PathBuf;
use std::time::Duration;

/// Error enum for agent task launch and completion failures.
///
/// Categories:
/// - Launch: the agent process could not be spawned (eligible for hook classification)
/// - Hook: the agent's pre/post-execution hook mechanism failed — the one retryable class
/// - TimedOut: wall-clock deadline exceeded, process was killed
/// - ArtifactMissing / NonZeroExit: completion-time failures, enriched with a
///   reason mined from the agent log
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PilotError {
    #[error("failed to launch agent: {0}")]
    Launch(String),

    #[error("agent hook error: {0}")]
    Hook(String),

    #[error("agent timed out after {0:?}")]
    TimedOut(Duration),

    #[error("expected output {path} not produced: {reason}")]
    ArtifactMissing { path: PathBuf, reason: String },

    #[error("agent exited with error (exit={code}): {reason}")]
    NonZeroExit { code: i32, reason: String },
}

impl PilotError {
    /// Returns true if this failure belongs to the recoverable hook class.
    ///
    /// `Hook` is classified by type. `Launch`, `ArtifactMissing`, and
    /// `NonZeroExit` carry opaque text from the external tool, so those fall
    /// back to a case-insensitive substring match. `TimedOut` never
    /// classifies as hook-related regardless of message content.
    pub fn is_hook_related(&self) -> bool {
        match self {
            PilotError::Hook(_) => true,
            PilotError::Launch(msg) => mentions_hook(msg),
            PilotError::ArtifactMissing { reason, .. } => mentions_hook(reason),
            PilotError::NonZeroExit { reason, .. } => mentions_hook(reason),
            PilotError::TimedOut(_) => false,
        }
    }

    /// Returns true if the watcher already killed the underlying process
    /// for this failure, so no further kill attempt is needed.
    pub fn process_was_killed(&self) -> bool {
        matches!(self, PilotError::TimedOut(_))
    }

    /// Promote an opaque external-tool error to the typed hook variant when
    /// its text marks it as hook-originated, leaving it untouched otherwise.
    pub fn reclassify_hook(self) -> Self {
        match self {
            PilotError::Launch(msg) if mentions_hook(&msg) => PilotError::Hook(msg),
            other => other,
        }
    }
}

fn mentions_hook(text: &str) -> bool {
    text.to_lowercase().contains("hook")
}
