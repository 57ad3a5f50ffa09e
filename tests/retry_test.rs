use std::time::Duration;

use issue_pilot::error::PilotError;
use issue_pilot::retry::{DenyAllDecisions, MockDecisionProvider, RetryGate};

fn hook_error() -> PilotError {
    PilotError::Hook("PostToolUse hook exited with status 1".to_string())
}

#[test]
fn test_default_gate_bounds() {
    let gate = RetryGate::default();
    assert_eq!(gate.max_attempts, 3);
    assert_eq!(gate.decision_timeout, Duration::from_secs(300));
}

#[tokio::test]
async fn test_non_hook_error_never_consults_provider() {
    let gate = RetryGate::default();
    let provider = MockDecisionProvider::new(vec![true]);

    let err = PilotError::NonZeroExit {
        code: 1,
        reason: "tests failed".to_string(),
    };
    assert!(!gate.should_retry(&provider, "VID-1", "plan", &err, 1).await);
    assert!(provider.asks().is_empty());
}

#[tokio::test]
async fn test_hook_error_retries_when_provider_approves() {
    let gate = RetryGate::default();
    let provider = MockDecisionProvider::new(vec![true]);

    assert!(
        gate.should_retry(&provider, "VID-1", "plan", &hook_error(), 1)
            .await
    );
    assert_eq!(
        provider.asks(),
        vec![("VID-1".to_string(), "plan".to_string())]
    );
}

#[tokio::test]
async fn test_hook_error_respects_provider_denial() {
    let gate = RetryGate::default();
    let provider = MockDecisionProvider::new(vec![false]);

    assert!(
        !gate
            .should_retry(&provider, "VID-2", "exec", &hook_error(), 1)
            .await
    );
    assert_eq!(provider.asks().len(), 1);
}

#[tokio::test]
async fn test_attempt_bound_skips_provider() {
    let gate = RetryGate::new(3, Duration::from_secs(300));
    let provider = MockDecisionProvider::new(vec![true, true]);

    // Attempt 3 of 3 — exhausted, provider never asked
    assert!(
        !gate
            .should_retry(&provider, "VID-3", "plan", &hook_error(), 3)
            .await
    );
    assert!(provider.asks().is_empty());
}

#[tokio::test]
async fn test_silent_provider_defaults_to_no_retry() {
    let gate = RetryGate::new(3, Duration::from_millis(50));
    let provider = MockDecisionProvider::unresponsive();

    let start = std::time::Instant::now();
    let decision = gate
        .should_retry(&provider, "VID-4", "plan", &hook_error(), 1)
        .await;
    assert!(!decision);
    // The wait was bounded by the decision timeout, not indefinite
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(provider.asks().len(), 1);
}

#[tokio::test]
async fn test_deny_all_policy_provider() {
    let gate = RetryGate::default();
    assert!(
        !gate
            .should_retry(&DenyAllDecisions, "VID-5", "plan", &hook_error(), 1)
            .await
    );
}
