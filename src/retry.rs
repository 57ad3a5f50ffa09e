use std::time::Duration;

use crate::error::PilotError;
use crate::{log_info, log_warn};

/// External decision-maker (human or policy) consulted before retrying a
/// hook-class failure.
pub trait DecisionProvider: Send + Sync {
    fn ask_retry(
        &self,
        item_key: &str,
        phase_label: &str,
        error: &PilotError,
    ) -> impl std::future::Future<Output = bool> + Send;
}

/// Gate for the one recoverable failure class.
///
/// Hook errors get up to `max_attempts` launches total, each relaunch
/// confirmed by the decision provider within `decision_timeout` (silence
/// means "do not retry"). Non-hook errors never reach the provider: they
/// are terminal on first occurrence.
#[derive(Clone, Debug)]
pub struct RetryGate {
    pub max_attempts: u32,
    pub decision_timeout: Duration,
}

impl Default for RetryGate {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            decision_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl RetryGate {
    pub fn new(max_attempts: u32, decision_timeout: Duration) -> Self {
        Self {
            max_attempts,
            decision_timeout,
        }
    }

    /// Decide whether to relaunch after a failed attempt.
    ///
    /// `attempt` is 1-based: the attempt that just failed.
    pub async fn should_retry<D: DecisionProvider>(
        &self,
        provider: &D,
        item_key: &str,
        phase_label: &str,
        error: &PilotError,
        attempt: u32,
    ) -> bool {
        if !error.is_hook_related() {
            return false;
        }

        if attempt >= self.max_attempts {
            log_info!(
                "[{}][{}] Hook error after {} attempts, giving up: {}",
                item_key,
                phase_label.to_uppercase(),
                attempt,
                error
            );
            return false;
        }

        match tokio::time::timeout(
            self.decision_timeout,
            provider.ask_retry(item_key, phase_label, error),
        )
        .await
        {
            Ok(decision) => decision,
            Err(_) => {
                log_warn!(
                    "[{}][{}] No retry decision within {:?}, treating as no",
                    item_key,
                    phase_label.to_uppercase(),
                    self.decision_timeout
                );
                false
            }
        }
    }
}

/// Policy provider that always declines. The non-interactive default.
pub struct DenyAllDecisions;

impl DecisionProvider for DenyAllDecisions {
    async fn ask_retry(&self, _item_key: &str, _phase_label: &str, _error: &PilotError) -> bool {
        false
    }
}

/// Interactive provider: prompts on stderr, reads y/n from stdin.
///
/// The blocking read runs on the tokio blocking pool; the gate's timeout
/// bounds how long the orchestrator waits for the answer.
pub struct StdinDecisionProvider;

impl DecisionProvider for StdinDecisionProvider {
    async fn ask_retry(&self, item_key: &str, phase_label: &str, error: &PilotError) -> bool {
        eprintln!(
            "\n[{}][{}] Hook error: {}\nRetry? [y/N] ",
            item_key,
            phase_label.to_uppercase(),
            error
        );
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            match std::io::stdin().read_line(&mut line) {
                Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false)
    }
}

/// Mock provider for tests: scripted answers, recorded asks.
pub struct MockDecisionProvider {
    answers: tokio::sync::Mutex<Vec<bool>>,
    asks: std::sync::Mutex<Vec<(String, String)>>,
    /// When set, `ask_retry` never resolves — simulates an absent human so
    /// gate-timeout behavior can be exercised.
    hang: bool,
}

impl MockDecisionProvider {
    /// Answers are returned in order; once exhausted, further asks get `false`.
    pub fn new(answers: Vec<bool>) -> Self {
        let mut reversed = answers;
        reversed.reverse();
        Self {
            answers: tokio::sync::Mutex::new(reversed),
            asks: std::sync::Mutex::new(Vec::new()),
            hang: false,
        }
    }

    /// A provider that never answers.
    pub fn unresponsive() -> Self {
        Self {
            answers: tokio::sync::Mutex::new(Vec::new()),
            asks: std::sync::Mutex::new(Vec::new()),
            hang: true,
        }
    }

    /// `(item_key, phase_label)` pairs seen, in ask order.
    pub fn asks(&self) -> Vec<(String, String)> {
        self.asks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DecisionProvider for MockDecisionProvider {
    async fn ask_retry(&self, item_key: &str, phase_label: &str, _error: &PilotError) -> bool {
        self.asks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((item_key.to_string(), phase_label.to_string()));
        if self.hang {
            std::future::pending::<()>().await;
        }
        let mut answers = self.answers.lock().await;
        answers.pop().unwrap_or(false)
    }
}
