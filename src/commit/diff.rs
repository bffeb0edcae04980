//! Diff aggregation.
//!
//! Merges the staged diff, the unstaged diff and the content of new files into
//! one labelled block of text that is sent to the model as the user message.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::git::{relative_to, ChangeSet, VcsError, VcsRepository};

/// Section labels, declared in rendering priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SectionLabel {
    /// Worktree changes not yet staged.
    Unstaged,
    /// Changes staged in the index.
    Staged,
    /// Content of untracked files.
    NewFiles,
}

impl SectionLabel {
    /// All labels in rendering order.
    pub const ALL: [Self; 3] = [Self::Unstaged, Self::Staged, Self::NewFiles];

    /// Header text for the section.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unstaged => "Unstaged git diff",
            Self::Staged => "Staged git diff",
            Self::NewFiles => "New files",
        }
    }
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled part of the aggregated diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSection {
    /// Which change source this text came from.
    pub label: SectionLabel,
    /// Section body; may be empty.
    pub text: String,
}

impl DiffSection {
    /// Creates a section.
    pub fn new(label: SectionLabel, text: impl Into<String>) -> Self {
        Self {
            label,
            text: text.into(),
        }
    }
}

/// Non-empty sections rendered in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedDiff {
    sections: Vec<DiffSection>,
    text: String,
}

impl AggregatedDiff {
    /// Builds the aggregate from sections given in any order.
    ///
    /// Sections with empty text are dropped; the rest are ordered by
    /// [`SectionLabel`] priority, each prefixed by its label, and joined by a
    /// blank line.
    pub fn from_sections<I>(sections: I) -> Self
    where
        I: IntoIterator<Item = DiffSection>,
    {
        let mut sections: Vec<DiffSection> = sections
            .into_iter()
            .filter(|s| !s.text.is_empty())
            .collect();
        // Stable, so repeated labels keep their relative order.
        sections.sort_by_key(|s| s.label);

        let text = sections
            .iter()
            .map(|s| format!("{}:\n{}", s.label, s.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        Self { sections, text }
    }

    /// The rendered prompt text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Sections that made it into the text.
    pub fn sections(&self) -> &[DiffSection] {
        &self.sections
    }

    /// True when no section had any content.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Consumes the aggregate, returning the rendered text.
    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for AggregatedDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Collects the three change sources for a [`ChangeSet`].
///
/// Performs blocking repository queries and file reads; run it on a worker
/// thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffCollector;

impl DiffCollector {
    /// Creates a collector.
    pub fn new() -> Self {
        Self
    }

    /// Gathers and aggregates the diff for `change_set`.
    ///
    /// Without a repository the result is empty. Repository query failures
    /// are returned as-is; unreadable new files are left out.
    pub fn collect<R: VcsRepository>(
        &self,
        change_set: &ChangeSet,
        repository: Option<&R>,
    ) -> Result<AggregatedDiff, VcsError> {
        let Some(repository) = repository else {
            debug!("No repository for project, sending an empty diff");
            return Ok(AggregatedDiff::default());
        };

        let versioned = change_set.versioned_paths();
        let staged = repository.staged_diff(&versioned)?;
        let unstaged = repository.unstaged_diff(&versioned)?;
        let new_files = self.new_files(repository.root(), &change_set.unversioned);

        debug!(
            staged_files = staged.len(),
            unstaged_files = unstaged.len(),
            new_files = new_files.len(),
            "Collected diff sections"
        );

        Ok(AggregatedDiff::from_sections([
            DiffSection::new(SectionLabel::Unstaged, unstaged.join("\n")),
            DiffSection::new(SectionLabel::Staged, staged.join("\n")),
            DiffSection::new(SectionLabel::NewFiles, new_files.join("\n")),
        ]))
    }

    fn new_files<'a, I>(&self, root: &Path, paths: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        paths
            .into_iter()
            .filter_map(|path| {
                let absolute = if path.is_absolute() {
                    path.clone()
                } else {
                    root.join(path)
                };
                match fs::read_to_string(&absolute) {
                    Ok(content) => Some(format!(
                        "New file '{}' content:\n{}",
                        relative_to(root, path).display(),
                        content
                    )),
                    Err(e) => {
                        debug!(path = %absolute.display(), error = %e, "Skipping unreadable new file");
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commit::test_utils::StaticRepository;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn no_changes_yield_empty_text() {
        let dir = TempDir::new().unwrap();
        let repo = StaticRepository::new(dir.path());
        let diff = DiffCollector::new()
            .collect(&ChangeSet::default(), Some(&repo))
            .unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.text(), "");
    }

    #[test]
    fn missing_repository_yields_empty_diff() {
        let change_set = ChangeSet::new(["a.rs"], ["b.rs"]);
        let diff = DiffCollector::new()
            .collect::<StaticRepository>(&change_set, None)
            .unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn sections_render_unstaged_staged_then_new_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("new.txt"), "hello").unwrap();

        let mut repo = StaticRepository::new(dir.path());
        repo.staged = vec!["staged-a".to_string(), "staged-b".to_string()];
        repo.unstaged = vec!["unstaged-a".to_string()];

        let change_set = ChangeSet::new(["tracked.rs"], [dir.path().join("new.txt")]);
        let diff = DiffCollector::new().collect(&change_set, Some(&repo)).unwrap();

        assert_eq!(
            diff.text(),
            "Unstaged git diff:\nunstaged-a\n\n\
             Staged git diff:\nstaged-a\nstaged-b\n\n\
             New files:\nNew file 'new.txt' content:\nhello"
        );
    }

    #[test]
    fn empty_sections_are_not_rendered() {
        let dir = TempDir::new().unwrap();
        let mut repo = StaticRepository::new(dir.path());
        repo.staged = vec!["only staged".to_string()];

        let change_set = ChangeSet::new(["tracked.rs"], Vec::<PathBuf>::new());
        let diff = DiffCollector::new().collect(&change_set, Some(&repo)).unwrap();

        assert_eq!(diff.text(), "Staged git diff:\nonly staged");
        assert_eq!(diff.sections().len(), 1);
    }

    #[test]
    fn unreadable_new_file_is_omitted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readable.txt"), "fine").unwrap();
        let repo = StaticRepository::new(dir.path());

        let change_set = ChangeSet::new(
            Vec::<PathBuf>::new(),
            [PathBuf::from("readable.txt"), PathBuf::from("missing.txt")],
        );
        let diff = DiffCollector::new().collect(&change_set, Some(&repo)).unwrap();

        assert_eq!(
            diff.text(),
            "New files:\nNew file 'readable.txt' content:\nfine"
        );
    }

    #[test]
    fn multiple_new_files_are_joined_by_newline() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "A").unwrap();
        fs::write(dir.path().join("b.txt"), "B").unwrap();
        let repo = StaticRepository::new(dir.path());

        let change_set = ChangeSet::new(
            Vec::<PathBuf>::new(),
            [PathBuf::from("a.txt"), PathBuf::from("b.txt")],
        );
        let diff = DiffCollector::new().collect(&change_set, Some(&repo)).unwrap();

        assert_eq!(
            diff.text(),
            "New files:\nNew file 'a.txt' content:\nA\nNew file 'b.txt' content:\nB"
        );
    }

    #[test]
    fn repository_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let mut repo = StaticRepository::new(dir.path());
        repo.fail = true;

        let change_set = ChangeSet::new(["tracked.rs"], Vec::<PathBuf>::new());
        let err = DiffCollector::new()
            .collect(&change_set, Some(&repo))
            .unwrap_err();
        assert!(matches!(err, VcsError::Diff(_)));
    }

    fn label_strategy() -> impl Strategy<Value = SectionLabel> {
        prop_oneof![
            Just(SectionLabel::Unstaged),
            Just(SectionLabel::Staged),
            Just(SectionLabel::NewFiles),
        ]
    }

    proptest! {
        #[test]
        fn rendering_order_ignores_input_order(
            sections in proptest::collection::vec((label_strategy(), "[a-z]{0,8}"), 0..6)
        ) {
            let diff = AggregatedDiff::from_sections(
                sections.iter().map(|(label, text)| DiffSection::new(*label, text.clone())),
            );

            let labels: Vec<SectionLabel> = diff.sections().iter().map(|s| s.label).collect();
            let mut sorted = labels.clone();
            sorted.sort();
            prop_assert_eq!(&labels, &sorted);
            prop_assert!(diff.sections().iter().all(|s| !s.text.is_empty()));

            let expected_empty = sections.iter().all(|(_, text)| text.is_empty());
            prop_assert_eq!(diff.is_empty(), expected_empty);
        }
    }
}
