//! The set of files selected for commit.

use std::collections::BTreeSet;
use std::path::PathBuf;

/// Paths selected for commit, split into tracked and untracked files.
///
/// Sets keep each partition unique and give a stable iteration order, so the
/// "New files" section renders the same way on every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Tracked paths that may carry staged or unstaged modifications.
    pub versioned: BTreeSet<PathBuf>,
    /// New paths not yet known to version control.
    pub unversioned: BTreeSet<PathBuf>,
}

impl ChangeSet {
    /// Creates a change set from the two partitions.
    pub fn new<V, U>(versioned: V, unversioned: U) -> Self
    where
        V: IntoIterator,
        V::Item: Into<PathBuf>,
        U: IntoIterator,
        U::Item: Into<PathBuf>,
    {
        Self {
            versioned: versioned.into_iter().map(Into::into).collect(),
            unversioned: unversioned.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true when no file is selected.
    pub fn is_empty(&self) -> bool {
        self.versioned.is_empty() && self.unversioned.is_empty()
    }

    /// Total number of selected files.
    pub fn len(&self) -> usize {
        self.versioned.len() + self.unversioned.len()
    }

    /// Tracked paths as a vector, in sorted order.
    pub fn versioned_paths(&self) -> Vec<PathBuf> {
        self.versioned.iter().cloned().collect()
    }

    /// Keeps only the paths accepted by `keep`.
    #[must_use]
    pub fn retain<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&PathBuf) -> bool,
    {
        self.versioned.retain(|p| keep(p));
        self.unversioned.retain(|p| keep(p));
        self
    }
}
