//! Git operations and the repository query interface used by diff collection.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod change_set;
pub mod repository;

pub use change_set::ChangeSet;
pub use repository::{GitProvider, GitRepository};

/// Errors raised by version-control queries.
#[derive(Error, Debug)]
pub enum VcsError {
    /// The repository could not be opened.
    #[error("Failed to open repository")]
    OpenRepository(#[source] git2::Error),

    /// HEAD could not be resolved to a tree.
    #[error("Failed to resolve HEAD")]
    ResolveHead(#[source] git2::Error),

    /// Computing a diff failed.
    #[error("Failed to compute diff")]
    Diff(#[source] git2::Error),

    /// Reading the working tree status failed.
    #[error("Failed to read repository status")]
    Status(#[source] git2::Error),

    /// The repository has no working directory.
    #[error("Repository at {0} is bare")]
    BareRepository(PathBuf),
}

/// Resolves the repository a project lives in.
///
/// Returning `None` means no repository could be found; callers treat that as
/// "nothing to diff" rather than as a failure.
pub trait VcsProvider: Send + Sync {
    /// Repository handle produced by this provider.
    type Repository: VcsRepository;

    /// Returns the repository for the current project, if there is one.
    fn project_repository(&self) -> Option<Self::Repository>;
}

/// Diff queries against a single repository.
///
/// Paths passed in may be absolute or relative to [`VcsRepository::root`].
/// An empty path list always yields an empty result.
pub trait VcsRepository {
    /// Working directory root of the repository.
    fn root(&self) -> &Path;

    /// Per-file patches of staged (index vs HEAD) changes for `paths`.
    fn staged_diff(&self, paths: &[PathBuf]) -> Result<Vec<String>, VcsError>;

    /// Per-file patches of unstaged (worktree vs index) changes for `paths`.
    fn unstaged_diff(&self, paths: &[PathBuf]) -> Result<Vec<String>, VcsError>;
}

/// Returns `path` relative to `root`, or `path` unchanged when it lies elsewhere.
pub fn relative_to<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
