//! Commit message generation: diff aggregation, the token budget gate, prompt
//! assembly and the discipline for writing streamed text into the message.

pub mod diff;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod sink;
pub mod token_budget;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_utils;

pub use diff::{AggregatedDiff, DiffCollector, DiffSection, SectionLabel};
pub use error::GenerateError;
pub use pipeline::{CommitMessageGenerator, CommitSurface, GenerationOutcome};
pub use prompt::{render_template, CompletionRequest, PromptAssembler, DEFAULT_SYSTEM_PROMPT};
pub use sink::{CommitMessageSink, EditId, MessageBuffer, SinkError, SinkUpdater};
pub use token_budget::{
    BudgetAssessment, BudgetDecision, HeuristicEstimator, TokenBudgetGuard, TokenEstimator,
    DEFAULT_SOFT_TOKEN_LIMIT,
};
