//! # gitscribe
//!
//! Generates commit messages from pending git changes with an OpenAI-compatible
//! model, streaming the answer into the commit message as it arrives.
//!
//! The pipeline lives in [`commit`]: [`commit::DiffCollector`] merges staged,
//! unstaged and new-file changes, [`commit::TokenBudgetGuard`] asks before
//! sending oversized prompts, and [`commit::SinkUpdater`] applies streamed
//! [`ai::StreamEvent`]s to a [`commit::CommitMessageSink`] on the interactive
//! thread managed by [`ui`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod ai;
pub mod cli;
pub mod commit;
pub mod git;
pub mod ui;
pub mod utils;

pub use crate::cli::Cli;
