//! Errors that abort commit message generation.

use thiserror::Error;

use crate::git::VcsError;

/// Failures raised before any text reaches the commit message.
#[derive(Error, Debug)]
pub enum GenerateError {
    /// A version-control query failed while collecting the diff.
    #[error("Unable to get staged diff")]
    DiffRetrieval(#[source] VcsError),

    /// The background collection task panicked or was cancelled.
    #[error("Diff collection did not finish")]
    Worker(#[source] tokio::task::JoinError),
}

impl From<VcsError> for GenerateError {
    fn from(err: VcsError) -> Self {
        Self::DiffRetrieval(err)
    }
}
