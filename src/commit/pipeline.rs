//! End-to-end commit message generation.
//!
//! Collects the diff on a blocking worker, hands control to the interactive
//! thread once for the soft-limit check, then starts the completion request
//! and lets a [`SinkUpdater`] apply its events.

use std::sync::Arc;

use tracing::{debug, info};

use super::diff::{AggregatedDiff, DiffCollector};
use super::error::GenerateError;
use super::prompt::PromptAssembler;
use super::sink::{CommitMessageSink, SinkUpdater};
use super::token_budget::{BudgetDecision, TokenBudgetGuard};
use crate::ai::{CompletionClient, StreamHandle};
use crate::git::{ChangeSet, VcsProvider};
use crate::ui::{ErrorSink, SoftLimitDialog, UiHandle};

/// Everything a commit dialog offers the pipeline.
pub trait CommitSurface: CommitMessageSink + ErrorSink + SoftLimitDialog + 'static {}

impl<T> CommitSurface for T where T: CommitMessageSink + ErrorSink + SoftLimitDialog + 'static {}

/// How a generation request ended on the caller's side.
#[derive(Debug)]
pub enum GenerationOutcome {
    /// The request is streaming into the sink.
    Started(StreamHandle),
    /// The user declined to send an oversized prompt.
    Aborted,
}

/// Runs the diff → budget → prompt → completion → sink pipeline.
pub struct CommitMessageGenerator<P> {
    provider: Arc<P>,
    client: Arc<dyn CompletionClient>,
    guard: TokenBudgetGuard,
    collector: DiffCollector,
}

impl<P> CommitMessageGenerator<P>
where
    P: VcsProvider + 'static,
{
    /// Creates a generator with the default soft token limit.
    pub fn new(provider: Arc<P>, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            provider,
            client,
            guard: TokenBudgetGuard::default(),
            collector: DiffCollector::new(),
        }
    }

    /// Replaces the token budget guard.
    #[must_use]
    pub fn with_guard(mut self, guard: TokenBudgetGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Collects the aggregated diff on a blocking worker thread.
    pub async fn collect_diff(&self, change_set: ChangeSet) -> Result<AggregatedDiff, GenerateError> {
        let provider = Arc::clone(&self.provider);
        let collector = self.collector;
        let diff = tokio::task::spawn_blocking(move || {
            let repository = provider.project_repository();
            collector.collect(&change_set, repository.as_ref())
        })
        .await
        .map_err(GenerateError::Worker)??;
        Ok(diff)
    }

    /// Generates a commit message for `change_set` into the surface behind `ui`.
    ///
    /// Returns once the request is streaming; await the returned
    /// [`StreamHandle`] to wait for the terminal event. Fails without touching
    /// the sink if the diff cannot be collected.
    pub async fn generate<S>(
        &self,
        change_set: ChangeSet,
        system_prompt: &str,
        ui: &UiHandle<S>,
    ) -> Result<GenerationOutcome, GenerateError>
    where
        S: CommitSurface,
    {
        let diff = self.collect_diff(change_set).await?;
        debug!(diff_len = diff.text().len(), sections = diff.sections().len(), "Diff collected");

        if self.guard.check(diff.text(), ui).await == BudgetDecision::Abort {
            return Ok(GenerationOutcome::Aborted);
        }

        let request = PromptAssembler::assemble(diff.into_text(), system_prompt);
        let metadata = self.client.metadata();
        info!(
            provider = %metadata.provider,
            model = %metadata.model,
            streaming = metadata.streaming,
            "Requesting commit message"
        );

        let listener = SinkUpdater::new(ui.clone());
        Ok(GenerationOutcome::Started(
            self.client.stream(request, Box::new(listener)),
        ))
    }
}
