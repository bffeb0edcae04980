//! Token estimation and the soft-limit gate in front of the completion call.

use std::sync::Arc;

use tracing::{debug, info};

use crate::ui::{SoftLimitDialog, UiHandle};

/// Prompt size above which the user is asked before sending.
pub const DEFAULT_SOFT_TOKEN_LIMIT: usize = 4096;

/// Approximate characters per token for heuristic estimation.
const CHARS_PER_TOKEN: f64 = 3.5;

/// Safety margin multiplier applied to token estimates.
const SAFETY_MARGIN: f64 = 1.10;

/// Counts tokens in prompt text.
pub trait TokenEstimator: Send + Sync {
    /// Returns the estimated token count of `text`.
    fn count_tokens(&self, text: &str) -> usize;
}

/// Byte-length heuristic: 1 token per 3.5 bytes plus a 10% margin, rounded up.
///
/// Deliberately overestimates; the gate is a warning, not a hard cap.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn count_tokens(&self, text: &str) -> usize {
        let raw_estimate = text.len() as f64 / CHARS_PER_TOKEN;
        (raw_estimate * SAFETY_MARGIN).ceil() as usize
    }
}

/// Outcome of the soft-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// Send the prompt.
    Proceed,
    /// The user declined; stop without notifying anyone.
    Abort,
}

/// Estimate-only outcome, before asking anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetAssessment {
    /// At or below the soft limit.
    WithinLimit {
        /// Estimated prompt tokens.
        tokens: usize,
    },
    /// Above the soft limit; the user has to confirm.
    NeedsConfirmation {
        /// Estimated prompt tokens.
        tokens: usize,
    },
}

/// Asks for confirmation before sending prompts larger than the soft limit.
#[derive(Clone)]
pub struct TokenBudgetGuard {
    estimator: Arc<dyn TokenEstimator>,
    soft_limit: usize,
}

impl std::fmt::Debug for TokenBudgetGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudgetGuard")
            .field("soft_limit", &self.soft_limit)
            .finish_non_exhaustive()
    }
}

impl Default for TokenBudgetGuard {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicEstimator), DEFAULT_SOFT_TOKEN_LIMIT)
    }
}

impl TokenBudgetGuard {
    /// Creates a guard with a custom estimator and limit.
    pub fn new(estimator: Arc<dyn TokenEstimator>, soft_limit: usize) -> Self {
        Self {
            estimator,
            soft_limit,
        }
    }

    /// Estimates `diff_text` against the limit. The limit itself is allowed.
    pub fn assess(&self, diff_text: &str) -> BudgetAssessment {
        let tokens = self.estimator.count_tokens(diff_text);
        if tokens > self.soft_limit {
            BudgetAssessment::NeedsConfirmation { tokens }
        } else {
            BudgetAssessment::WithinLimit { tokens }
        }
    }

    /// Gates `diff_text`, showing the confirmation on the interactive thread
    /// when it is over the limit.
    ///
    /// A closed interactive thread counts as a refusal.
    pub async fn check<S>(&self, diff_text: &str, ui: &UiHandle<S>) -> BudgetDecision
    where
        S: SoftLimitDialog + 'static,
    {
        let tokens = match self.assess(diff_text) {
            BudgetAssessment::WithinLimit { tokens } => {
                debug!(tokens, soft_limit = self.soft_limit, "Prompt within soft token limit");
                return BudgetDecision::Proceed;
            }
            BudgetAssessment::NeedsConfirmation { tokens } => tokens,
        };

        let soft_limit = self.soft_limit;
        match ui
            .invoke_and_wait(move |dialog| dialog.confirm_soft_limit(tokens, soft_limit))
            .await
        {
            Ok(true) => {
                info!(tokens, soft_limit, "User accepted prompt above soft token limit");
                BudgetDecision::Proceed
            }
            Ok(false) => {
                info!(tokens, soft_limit, "User declined prompt above soft token limit");
                BudgetDecision::Abort
            }
            Err(closed) => {
                debug!(error = %closed, "Confirmation could not be shown");
                BudgetDecision::Abort
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ui;

    /// Reports a fixed count regardless of input.
    struct FixedEstimator(usize);

    impl TokenEstimator for FixedEstimator {
        fn count_tokens(&self, _text: &str) -> usize {
            self.0
        }
    }

    #[derive(Default)]
    struct ScriptedDialog {
        answer: bool,
        asked: Vec<(usize, usize)>,
    }

    impl SoftLimitDialog for ScriptedDialog {
        fn confirm_soft_limit(&mut self, token_count: usize, soft_limit: usize) -> bool {
            self.asked.push((token_count, soft_limit));
            self.answer
        }
    }

    fn guard(tokens: usize) -> TokenBudgetGuard {
        TokenBudgetGuard::new(Arc::new(FixedEstimator(tokens)), DEFAULT_SOFT_TOKEN_LIMIT)
    }

    async fn run_check(
        guard: &TokenBudgetGuard,
        answer: bool,
    ) -> (BudgetDecision, Vec<(usize, usize)>) {
        let (handle, ui_loop) = ui::channel::<ScriptedDialog>();
        let worker = std::thread::spawn(move || {
            let mut dialog = ScriptedDialog {
                answer,
                ..ScriptedDialog::default()
            };
            ui_loop.run_blocking(&mut dialog);
            dialog.asked
        });
        let decision = guard.check("diff", &handle).await;
        drop(handle);
        (decision, worker.join().unwrap())
    }

    #[test]
    fn heuristic_empty_string() {
        assert_eq!(HeuristicEstimator.count_tokens(""), 0);
    }

    #[test]
    fn heuristic_rounds_up() {
        // 5 bytes -> 5/3.5 * 1.10 = 1.57 -> 2
        assert_eq!(HeuristicEstimator.count_tokens("hello"), 2);
    }

    #[test]
    fn heuristic_includes_safety_margin() {
        let text = "x".repeat(3500);
        assert_eq!(HeuristicEstimator.count_tokens(&text), 1100);
    }

    #[test]
    fn exactly_at_limit_is_within() {
        assert_eq!(
            guard(4096).assess("ignored"),
            BudgetAssessment::WithinLimit { tokens: 4096 }
        );
    }

    #[test]
    fn one_over_limit_needs_confirmation() {
        assert_eq!(
            guard(4097).assess("ignored"),
            BudgetAssessment::NeedsConfirmation { tokens: 4097 }
        );
    }

    #[tokio::test]
    async fn at_limit_proceeds_without_asking() {
        let (decision, asked) = run_check(&guard(4096), false).await;
        assert_eq!(decision, BudgetDecision::Proceed);
        assert!(asked.is_empty());
    }

    #[tokio::test]
    async fn over_limit_asks_and_respects_decline() {
        let (decision, asked) = run_check(&guard(4097), false).await;
        assert_eq!(decision, BudgetDecision::Abort);
        assert_eq!(asked, vec![(4097, 4096)]);
    }

    #[tokio::test]
    async fn over_limit_asks_and_respects_accept() {
        let (decision, asked) = run_check(&guard(5000), true).await;
        assert_eq!(decision, BudgetDecision::Proceed);
        assert_eq!(asked, vec![(5000, 4096)]);
    }

    #[tokio::test]
    async fn closed_interactive_thread_aborts() {
        let (handle, ui_loop) = ui::channel::<ScriptedDialog>();
        ui_loop.close();
        assert_eq!(guard(9000).check("diff", &handle).await, BudgetDecision::Abort);
    }
}
