use serde::{Deserialize, Serialize};

/// Workflow phases for an issue, in forward order.
///
/// The model is advisory: any transition request is accepted, and callers
/// are responsible for only requesting forward transitions on the happy
/// path. `Failed` is reachable from every phase.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessPhase {
    #[default]
    Idle,
    FetchingSource,
    DownloadingMedia,
    ExtractingFrames,
    GeneratingDocument,
    Phase1Complete,
    PlanGenerating,
    PlanReady,
    PlanExecuting,
    /// Single-shot analysis mode from before plan/execute split. Kept so
    /// records written by older versions still load and display.
    Analyzing,
    Completed,
    Failed,
}

impl ProcessPhase {
    /// Fixed display string for progress output and history views.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProcessPhase::Idle => "Idle",
            ProcessPhase::FetchingSource => "Fetching issue",
            ProcessPhase::DownloadingMedia => "Downloading media",
            ProcessPhase::ExtractingFrames => "Extracting frames",
            ProcessPhase::GeneratingDocument => "Generating document",
            ProcessPhase::Phase1Complete => "Document ready",
            ProcessPhase::PlanGenerating => "Generating plan",
            ProcessPhase::PlanReady => "Plan ready",
            ProcessPhase::PlanExecuting => "Executing plan",
            ProcessPhase::Analyzing => "Analyzing",
            ProcessPhase::Completed => "Completed",
            ProcessPhase::Failed => "Failed",
        }
    }

    /// Fixed progress fraction in [0, 1]. Display only — never used for
    /// control flow.
    pub fn progress(&self) -> f32 {
        match self {
            ProcessPhase::Idle => 0.0,
            ProcessPhase::FetchingSource => 0.1,
            ProcessPhase::DownloadingMedia => 0.2,
            ProcessPhase::ExtractingFrames => 0.3,
            ProcessPhase::GeneratingDocument => 0.4,
            ProcessPhase::Phase1Complete => 0.5,
            ProcessPhase::PlanGenerating => 0.6,
            ProcessPhase::PlanReady => 0.75,
            ProcessPhase::PlanExecuting => 0.9,
            ProcessPhase::Analyzing => 0.6,
            ProcessPhase::Completed => 1.0,
            ProcessPhase::Failed => 1.0,
        }
    }

    /// Position in the forward ordering. Monotonically increasing during a
    /// successful run; `Failed` sorts last so history views keep terminal
    /// entries together.
    pub fn ordinal(&self) -> u8 {
        match self {
            ProcessPhase::Idle => 0,
            ProcessPhase::FetchingSource => 1,
            ProcessPhase::DownloadingMedia => 2,
            ProcessPhase::ExtractingFrames => 3,
            ProcessPhase::GeneratingDocument => 4,
            ProcessPhase::Phase1Complete => 5,
            ProcessPhase::PlanGenerating => 6,
            ProcessPhase::PlanReady => 7,
            ProcessPhase::PlanExecuting => 8,
            ProcessPhase::Analyzing => 6,
            ProcessPhase::Completed => 9,
            ProcessPhase::Failed => 10,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessPhase::Completed | ProcessPhase::Failed)
    }
}

impl std::fmt::Display for ProcessPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

pub fn parse_phase(s: &str) -> Result<ProcessPhase, String> {
    match s.to_lowercase().as_str() {
        "idle" => Ok(ProcessPhase::Idle),
        "fetching_source" | "fetch" => Ok(ProcessPhase::FetchingSource),
        "downloading_media" | "download" => Ok(ProcessPhase::DownloadingMedia),
        "extracting_frames" | "extract" => Ok(ProcessPhase::ExtractingFrames),
        "generating_document" | "document" => Ok(ProcessPhase::GeneratingDocument),
        "phase1_complete" => Ok(ProcessPhase::Phase1Complete),
        "plan_generating" | "plan" => Ok(ProcessPhase::PlanGenerating),
        "plan_ready" => Ok(ProcessPhase::PlanReady),
        "plan_executing" | "execute" => Ok(ProcessPhase::PlanExecuting),
        "analyzing" => Ok(ProcessPhase::Analyzing),
        "completed" => Ok(ProcessPhase::Completed),
        "failed" => Ok(ProcessPhase::Failed),
        _ => Err(format!(
            "Invalid phase '{}': expected one of idle, fetch, download, extract, \
             document, phase1_complete, plan, plan_ready, execute, analyzing, \
             completed, or failed",
            s
        )),
    }
}
