use std::path::Path;

/// Build the prompt for the plan-generation phase.
///
/// Structure: [Autonomous Preamble] + [Document] + [Output Contract]
///
/// The document section carries the full derived analysis document; the
/// output contract tells the agent where to write the plan artifact — the
/// watcher treats that path's existence as the completion signal, so the
/// instruction is repeated at the end of the prompt where agents follow it
/// most reliably.
pub fn build_plan_prompt(item_key: &str, document: &str, output_path: &Path) -> String {
    [
        preamble(item_key, "planning agent"),
        format!("## Issue Document\n\n{}", document.trim()),
        format!(
            "## Instructions\n\n\
             Produce a step-by-step implementation plan for this issue:\n\n\
             1. **Read the issue document** above, including any frame descriptions.\n\
             2. **Identify the root cause or required change** before proposing steps.\n\
             3. **Write a numbered plan** — each step names the files to touch and the change to make.\n\
             4. **Flag risks** — call out steps that could break existing behavior.\n\n\
             Write the complete plan to `{}`. Do not write any other files.",
            output_path.display()
        ),
    ]
    .join("\n\n")
}

/// Build the prompt for the plan-execution phase.
pub fn build_execute_prompt(item_key: &str, plan: &str, output_path: &Path) -> String {
    [
        preamble(item_key, "execution agent"),
        format!("## Approved Plan\n\n{}", plan.trim()),
        format!(
            "## Instructions\n\n\
             Execute the plan above step by step:\n\n\
             1. **Follow the steps in order.** If a step no longer applies, note why and continue.\n\
             2. **Keep changes minimal** — only what the plan calls for.\n\
             3. **Record what you did** per step, including deviations.\n\n\
             Write the execution report to `{}` when done. Do not write the report anywhere else.",
            output_path.display()
        ),
    ]
    .join("\n\n")
}

fn preamble(item_key: &str, role: &str) -> String {
    format!(
        "# Autonomous Agent\n\n\
         You are running autonomously as a {} for issue `{}` in the issue-pilot workflow.\n\
         No human is available for questions — use your judgment to make decisions.",
        role, item_key
    )
}
