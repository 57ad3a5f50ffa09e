/// Sentinel line prefix the launcher script appends to every agent log.
/// The full line has the form `"Claude exited with code: <integer>"`.
pub const EXIT_CODE_MARKER: &str = "Claude exited with code";

/// Substrings whose presence marks a log line as failure-relevant.
const FAILURE_MARKERS: [&str; 3] = ["hook", "error", "failed"];

/// Cap on the mined reason text, with a truncation marker when exceeded.
const REASON_MAX_LEN: usize = 400;

/// Non-empty tail lines used when no marker line matched.
const FALLBACK_TAIL_LINES: usize = 3;

/// Parse the exit code from the log's sentinel line.
///
/// Returns `Some(code)` for the last sentinel found (a retried task appends
/// a fresh sentinel per attempt), `None` when no sentinel line exists —
/// e.g. the process was killed before the launcher script could write one.
pub fn parse_exit_code(log_text: &str) -> Option<i32> {
    log_text
        .lines()
        .rev()
        .find_map(|line| {
            let rest = line.trim().strip_prefix(EXIT_CODE_MARKER)?;
            rest.trim_start_matches(':').trim().parse::<i32>().ok()
        })
}

/// Best-effort extraction of a human-readable failure reason from log text.
///
/// Scans for lines containing failure-indicating substrings
/// (case-insensitive "hook", "error", "failed"); falls back to the last few
/// non-empty lines when none match. Candidates are joined and capped at
/// `REASON_MAX_LEN` chars. May return an empty string, in which case the
/// caller surfaces the generic OS/file error instead.
pub fn mine_failure_reason(log_text: &str) -> String {
    let mut candidates: Vec<&str> = log_text
        .lines()
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_lowercase();
            FAILURE_MARKERS.iter().any(|m| lower.contains(m))
        })
        .collect();

    if candidates.is_empty() {
        let non_empty: Vec<&str> = log_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let start = non_empty.len().saturating_sub(FALLBACK_TAIL_LINES);
        candidates = non_empty[start..].to_vec();
    }

    truncate_reason(&candidates.join("; "))
}

fn truncate_reason(reason: &str) -> String {
    if reason.chars().count() <= REASON_MAX_LEN {
        return reason.to_string();
    }
    let cut: String = reason.chars().take(REASON_MAX_LEN).collect();
    format!("{}… [truncated]", cut)
}
