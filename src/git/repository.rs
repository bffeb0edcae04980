//! Git repository operations

use std::path::{Path, PathBuf};

use git2::{Diff, DiffOptions, ErrorCode, Patch, Repository, Status, StatusOptions, Tree};
use tracing::debug;

use super::{relative_to, ChangeSet, VcsError, VcsProvider, VcsRepository};

/// Locates the git repository enclosing a project directory.
#[derive(Debug, Clone)]
pub struct GitProvider {
    project_root: PathBuf,
}

impl GitProvider {
    /// Creates a provider that searches upwards from `project_root`.
    pub fn new<P: Into<PathBuf>>(project_root: P) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }
}

impl VcsProvider for GitProvider {
    type Repository = GitRepository;

    fn project_repository(&self) -> Option<GitRepository> {
        match GitRepository::discover(&self.project_root) {
            Ok(repo) => Some(repo),
            Err(e) => {
                debug!(project_root = %self.project_root.display(), error = %e, "No git repository for project");
                None
            }
        }
    }
}

/// Git repository wrapper
pub struct GitRepository {
    repo: Repository,
    root: PathBuf,
}

impl GitRepository {
    /// Open repository at specified path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self, VcsError> {
        let repo = Repository::open(path).map_err(VcsError::OpenRepository)?;
        Self::from_repository(repo)
    }

    /// Open the repository containing `path`, searching parent directories
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self, VcsError> {
        let repo = Repository::discover(path).map_err(VcsError::OpenRepository)?;
        Self::from_repository(repo)
    }

    fn from_repository(repo: Repository) -> Result<Self, VcsError> {
        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| VcsError::BareRepository(repo.path().to_path_buf()))?;
        Ok(Self { repo, root })
    }

    /// Path of the message file `git commit` pre-fills its editor with
    pub fn commit_editmsg_path(&self) -> PathBuf {
        self.repo.path().join("COMMIT_EDITMSG")
    }

    /// Current branch name, or `None` on a detached or unborn HEAD
    pub fn current_branch(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        head.shorthand()
            .filter(|name| *name != "HEAD")
            .map(ToString::to_string)
    }

    /// Build a change set from every pending change in the working tree.
    ///
    /// Index and worktree modifications of tracked files are versioned,
    /// untracked files are unversioned and ignored files are skipped. Paths
    /// are absolute.
    pub fn pending_change_set(&self) -> Result<ChangeSet, VcsError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(VcsError::Status)?;

        let mut change_set = ChangeSet::default();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else {
                continue;
            };
            let absolute = self.root.join(path);
            match classify_status(entry.status()) {
                Some(Tracking::Versioned) => {
                    change_set.versioned.insert(absolute);
                }
                Some(Tracking::Unversioned) => {
                    change_set.unversioned.insert(absolute);
                }
                None => {}
            }
        }

        debug!(
            versioned = change_set.versioned.len(),
            unversioned = change_set.unversioned.len(),
            "Collected pending changes"
        );
        Ok(change_set)
    }

    /// Resolve the HEAD tree, treating an unborn branch as "no tree".
    fn head_tree(&self) -> Result<Option<Tree<'_>>, VcsError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                return Ok(None);
            }
            Err(e) => return Err(VcsError::ResolveHead(e)),
        };
        let tree = head.peel_to_tree().map_err(VcsError::ResolveHead)?;
        Ok(Some(tree))
    }

    fn diff_options(&self, paths: &[PathBuf]) -> DiffOptions {
        let mut opts = DiffOptions::new();
        opts.disable_pathspec_match(true);
        for path in paths {
            opts.pathspec(pathspec(relative_to(&self.root, path)));
        }
        opts
    }
}

impl VcsRepository for GitRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn staged_diff(&self, paths: &[PathBuf]) -> Result<Vec<String>, VcsError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let head_tree = self.head_tree()?;
        let mut opts = self.diff_options(paths);
        let diff = self
            .repo
            .diff_tree_to_index(head_tree.as_ref(), None, Some(&mut opts))
            .map_err(VcsError::Diff)?;
        patches(&diff)
    }

    fn unstaged_diff(&self, paths: &[PathBuf]) -> Result<Vec<String>, VcsError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut opts = self.diff_options(paths);
        let diff = self
            .repo
            .diff_index_to_workdir(None, Some(&mut opts))
            .map_err(VcsError::Diff)?;
        patches(&diff)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Tracking {
    Versioned,
    Unversioned,
}

fn classify_status(flags: Status) -> Option<Tracking> {
    if flags.is_ignored() {
        return None;
    }

    let index_changed = flags.intersects(
        Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE,
    );
    let worktree_changed = flags.intersects(
        Status::WT_MODIFIED | Status::WT_DELETED | Status::WT_RENAMED | Status::WT_TYPECHANGE,
    );

    if index_changed || worktree_changed || flags.is_conflicted() {
        Some(Tracking::Versioned)
    } else if flags.is_wt_new() {
        Some(Tracking::Unversioned)
    } else {
        None
    }
}

/// Pathspecs always use forward slashes.
fn pathspec(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Render each delta of `diff` as its own unified patch.
fn patches(diff: &Diff<'_>) -> Result<Vec<String>, VcsError> {
    let mut out = Vec::new();
    for idx in 0..diff.deltas().len() {
        let Some(mut patch) = Patch::from_diff(diff, idx).map_err(VcsError::Diff)? else {
            continue;
        };
        let buf = patch.to_buf().map_err(VcsError::Diff)?;
        let text = String::from_utf8_lossy(&buf);
        let text = text.trim_end_matches('\n');
        if !text.is_empty() {
            out.push(text.to_string());
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;

    fn init_repo_with_commit(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        fs::write(dir.join("tracked.txt"), "original\n").unwrap();
        {
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("tracked.txt")).unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = Signature::now("Test User", "test@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn classify_untracked_as_unversioned() {
        assert_eq!(classify_status(Status::WT_NEW), Some(Tracking::Unversioned));
    }

    #[test]
    fn classify_staged_new_file_as_versioned() {
        assert_eq!(
            classify_status(Status::INDEX_NEW | Status::WT_MODIFIED),
            Some(Tracking::Versioned)
        );
    }

    #[test]
    fn classify_ignored_is_skipped() {
        assert_eq!(classify_status(Status::IGNORED), None);
    }

    #[test]
    fn pathspec_uses_forward_slashes() {
        let path: PathBuf = ["src", "git", "mod.rs"].iter().collect();
        assert_eq!(pathspec(&path), "src/git/mod.rs");
    }

    #[test]
    fn pending_change_set_partitions_files() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());
        fs::write(dir.path().join("tracked.txt"), "changed\n").unwrap();
        fs::write(dir.path().join("fresh.txt"), "new\n").unwrap();

        let repo = GitRepository::open_at(dir.path()).unwrap();
        let set = repo.pending_change_set().unwrap();

        let root = repo.root().to_path_buf();
        assert!(set.versioned.contains(&root.join("tracked.txt")));
        assert!(set.unversioned.contains(&root.join("fresh.txt")));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn staged_and_unstaged_diffs_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let raw = init_repo_with_commit(dir.path());

        fs::write(dir.path().join("tracked.txt"), "staged line\n").unwrap();
        let mut index = raw.index().unwrap();
        index.add_path(Path::new("tracked.txt")).unwrap();
        index.write().unwrap();
        fs::write(dir.path().join("tracked.txt"), "worktree line\n").unwrap();

        let repo = GitRepository::open_at(dir.path()).unwrap();
        let paths = vec![repo.root().join("tracked.txt")];

        let staged = repo.staged_diff(&paths).unwrap();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].contains("+staged line"));
        assert!(staged[0].contains("-original"));

        let unstaged = repo.unstaged_diff(&paths).unwrap();
        assert_eq!(unstaged.len(), 1);
        assert!(unstaged[0].contains("+worktree line"));
        assert!(unstaged[0].contains("-staged line"));
    }

    #[test]
    fn empty_path_list_yields_no_patches() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commit(dir.path());
        fs::write(dir.path().join("tracked.txt"), "changed\n").unwrap();

        let repo = GitRepository::open_at(dir.path()).unwrap();
        assert!(repo.staged_diff(&[]).unwrap().is_empty());
        assert!(repo.unstaged_diff(&[]).unwrap().is_empty());
    }

    #[test]
    fn staged_diff_on_unborn_branch_compares_against_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let raw = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("first.txt"), "hello\n").unwrap();
        let mut index = raw.index().unwrap();
        index.add_path(Path::new("first.txt")).unwrap();
        index.write().unwrap();

        let repo = GitRepository::open_at(dir.path()).unwrap();
        let staged = repo
            .staged_diff(&[repo.root().join("first.txt")])
            .unwrap();
        assert_eq!(staged.len(), 1);
        assert!(staged[0].contains("+hello"));
        assert_eq!(repo.current_branch(), None);
    }

    #[test]
    fn provider_returns_none_outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        let provider = GitProvider::new(dir.path());
        // A temp dir may sit under a repository on some machines; only assert
        // when discovery genuinely fails.
        if Repository::discover(dir.path()).is_err() {
            assert!(provider.project_repository().is_none());
        }
    }
}
