//! Git index files and the three-way merge engine.
//!
//! An [`Index`] wraps one index file path; every operation exports
//! `GIT_INDEX_FILE` so git works against that file and nothing else.
//! Temporary indexes (for merges that must not disturb the real staging
//! area) are uniquely-named files inside the git-dir, removed on drop.
//!
//! [`IndexAndWorktree`] pairs an index with a checked-out file tree for
//! the operations that need both: checkouts and conflict-spilling merges.

use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice};
use tracing::{debug, warn};

use crate::error::Error;
use crate::object::Tree;
use crate::oid::Oid;
use crate::repo::Repository;
use crate::run::GitRun;
use crate::signature::osstring_from_bytes;

#[derive(Debug)]
pub struct Index {
    git_dir: PathBuf,
    path: PathBuf,
    temp: Option<tempfile::TempPath>,
}

impl Index {
    /// Wrap an existing index file path (usually the repository default).
    #[must_use]
    pub fn new(git_dir: &Path, path: PathBuf) -> Self {
        Self {
            git_dir: git_dir.to_owned(),
            path,
            temp: None,
        }
    }

    /// Reserve a uniquely-named temporary index inside the git-dir.
    ///
    /// Only the name is reserved; git creates the file on first use. The
    /// name (and whatever git wrote there) is removed when the `Index` is
    /// dropped.
    ///
    /// # Errors
    /// [`Error::Io`] if the git-dir is not writable.
    pub fn temp(git_dir: &Path) -> Result<Self, Error> {
        let file = tempfile::Builder::new()
            .prefix("index.temp-")
            .tempfile_in(git_dir)?;
        let temp = file.into_temp_path();
        // git refuses zero-length index files; hold the name, not the file.
        let _ = std::fs::remove_file(&temp);
        debug!(path = %temp.display(), "temporary index reserved");
        Ok(Self {
            git_dir: git_dir.to_owned(),
            path: temp.to_path_buf(),
            temp: Some(temp),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run<'a, I>(&self, args: I) -> GitRun
    where
        I: IntoIterator<Item = &'a str>,
    {
        GitRun::new(args)
            .env("GIT_DIR", &self.git_dir)
            .env("GIT_INDEX_FILE", &self.path)
    }

    /// Load a tree into the index.
    ///
    /// # Errors
    /// [`Error::Run`] if `read-tree` fails.
    pub fn read_tree(&mut self, tree: &Tree) -> Result<(), Error> {
        self.run(["read-tree", tree.oid().as_str()]).ok()
    }

    /// Write the index out as a tree object.
    ///
    /// # Errors
    /// [`Error::ConflictingMerge`] when unresolved entries remain.
    pub fn write_tree(&mut self, repo: &Repository) -> Result<Tree, Error> {
        let line = self
            .run(["write-tree"])
            .one_line()
            .map_err(|_| Error::ConflictingMerge)?;
        Ok(repo.get_tree(&Oid::new(&line)?))
    }

    /// Whether the index matches the given tree (`diff-index --quiet
    /// --cached`).
    ///
    /// # Errors
    /// [`Error::Io`] only.
    pub fn is_clean(&self, tree: &Tree) -> Result<bool, Error> {
        let (_, output) = self
            .run(["diff-index", "--quiet", "--cached", tree.oid().as_str()])
            .status()?;
        Ok(output.status.success())
    }

    /// In-index patch application, no worktree involved.
    ///
    /// # Errors
    /// [`Error::DoesNotApply`] when the patch does not fit the index.
    pub fn apply(&mut self, patch_bytes: &[u8], quiet: bool) -> Result<(), Error> {
        let (_, output) = self
            .run(["apply", "--cached"])
            .stdin_bytes(patch_bytes.to_vec())
            .status()?;
        if output.status.success() {
            Ok(())
        } else {
            if !quiet {
                warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "git apply --cached rejected the patch"
                );
            }
            Err(Error::DoesNotApply)
        }
    }

    /// Apply the diff between two trees to the index.
    ///
    /// `--full-index` keeps binary files workable: the repository already
    /// holds every involved object, so full blob IDs are sufficient.
    ///
    /// # Errors
    /// [`Error::DoesNotApply`] when the diff does not fit the index.
    pub fn apply_treediff(
        &mut self,
        repo: &Repository,
        t1: &Tree,
        t2: &Tree,
        quiet: bool,
    ) -> Result<(), Error> {
        let patch = repo.diff_tree_patch(t1, t2, &["--full-index"], true)?;
        if patch.is_empty() {
            return Ok(());
        }
        self.apply(&patch, quiet)
    }

    /// Three-way merge of `base`, `ours`, `theirs` using only this index.
    ///
    /// `current` is a hint naming the tree currently loaded here, used to
    /// skip redundant `read-tree`s across iterated merges.
    ///
    /// Returns `(result, index_tree)`: `result` is the merged tree or
    /// `None` if the merge failed cleanly; `index_tree` is the tree now
    /// loaded in the index, or `None` if unknown.
    ///
    /// # Errors
    /// Propagates non-merge failures (I/O, subprocess breakage).
    pub fn merge(
        &mut self,
        repo: &Repository,
        base: &Tree,
        ours: &Tree,
        theirs: &Tree,
        current: Option<&Tree>,
    ) -> Result<(Option<Tree>, Option<Tree>), Error> {
        // The trivial cases need no git at all.
        if base == ours {
            return Ok((Some(theirs.clone()), current.cloned()));
        }
        if base == theirs {
            return Ok((Some(ours.clone()), current.cloned()));
        }
        if ours == theirs {
            return Ok((Some(ours.clone()), current.cloned()));
        }

        let (ours, theirs) = if current == Some(theirs) {
            // Merging is symmetric; swapping saves a read-tree.
            (theirs, ours)
        } else {
            (ours, theirs)
        };
        if current != Some(ours) {
            self.read_tree(ours)?;
        }
        match self
            .apply_treediff(repo, base, theirs, true)
            .and_then(|()| self.write_tree(repo))
        {
            Ok(result) => Ok((Some(result.clone()), Some(result))),
            Err(err) if err.is_merge_failure() => Ok((None, Some(ours.clone()))),
            Err(err) => Err(err),
        }
    }

    /// The set of paths with unmerged stages.
    ///
    /// # Errors
    /// [`Error::Run`] if `ls-files` fails.
    pub fn conflicts(&self) -> Result<Vec<BString>, Error> {
        let records = self.run(["ls-files", "-z", "--unmerged"]).lines_nulterm()?;
        let mut paths: Vec<BString> = records
            .iter()
            .filter_map(|record| record.split_once_str(b"\t"))
            .map(|(_, path)| path.as_bstr().to_owned())
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Remove the backing file if present.
    pub fn delete(&mut self) {
        if let Some(temp) = self.temp.take() {
            let _ = temp.close();
        } else if self.path.is_file() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// A checked-out file tree.
pub struct Worktree {
    dir: PathBuf,
}

impl Worktree {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// An index plus a worktree, for the operations that need both.
pub struct IndexAndWorktree {
    index: Index,
    worktree: Worktree,
}

impl IndexAndWorktree {
    #[must_use]
    pub fn new(index: Index, worktree: Worktree) -> Self {
        Self { index, worktree }
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.index
    }

    #[must_use]
    pub fn worktree(&self) -> &Worktree {
        &self.worktree
    }

    fn run<'a, I>(&self, args: I) -> GitRun
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.index
            .run(args)
            .env("GIT_WORK_TREE", ".")
            .current_dir(&self.worktree.dir)
    }

    /// Forcibly check out a tree, discarding local changes
    /// (`read-tree --reset -u`).
    ///
    /// # Errors
    /// [`Error::Run`] if git fails.
    pub fn checkout_hard(&mut self, tree: &Tree) -> Result<(), Error> {
        self.run(["read-tree", "--reset", "-u", tree.oid().as_str()])
            .ok()
    }

    /// Two-tree checkout carrying local changes along
    /// (`read-tree -u -m`).
    ///
    /// # Errors
    /// [`Error::CheckoutDirty`] when local modifications block the switch.
    pub fn checkout(&mut self, old_tree: &Tree, new_tree: &Tree) -> Result<(), Error> {
        self.run([
            "read-tree",
            "-u",
            "-m",
            "--exclude-per-directory=.gitignore",
            old_tree.oid().as_str(),
            new_tree.oid().as_str(),
        ])
        .ok()
        .map_err(|_| Error::CheckoutDirty)
    }

    /// Three-way merge through git's recursive driver, spilling conflicts
    /// into the index and worktree.
    ///
    /// The `GITHEAD_<sha>` variables label the three inputs in conflict
    /// markers.
    ///
    /// # Errors
    /// [`Error::MergeConflicts`] with the `CONFLICT …` lines on conflicts;
    /// [`Error::CheckoutDirty`] on any other non-zero exit.
    pub fn merge(&mut self, base: &Tree, ours: &Tree, theirs: &Tree) -> Result<(), Error> {
        let (_, output) = self
            .run([
                "merge-recursive",
                base.oid().as_str(),
                "--",
                ours.oid().as_str(),
                theirs.oid().as_str(),
            ])
            .env(format!("GITHEAD_{}", base.oid()), "ancestor")
            .env(format!("GITHEAD_{}", ours.oid()), "current")
            .env(format!("GITHEAD_{}", theirs.oid()), "patched")
            .status()?;
        match output.status.code() {
            Some(0) => Ok(()),
            Some(1) => {
                let conflicts = output
                    .stdout
                    .lines()
                    .filter(|line| line.starts_with(b"CONFLICT"))
                    .map(|line| String::from_utf8_lossy(line).into_owned())
                    .collect();
                Err(Error::MergeConflicts { conflicts })
            }
            _ => Err(Error::CheckoutDirty),
        }
    }

    /// Files in the worktree that differ from the given tree, optionally
    /// limited to the given paths.
    ///
    /// # Errors
    /// [`Error::Run`] if `diff-index` fails.
    pub fn changed_files(
        &self,
        tree: &Tree,
        pathlimits: &[BString],
    ) -> Result<Vec<BString>, Error> {
        let mut run = self.run([
            "diff-index",
            tree.oid().as_str(),
            "--name-only",
            "-z",
            "--",
        ]);
        for limit in pathlimits {
            run = run.arg(osstring_from_bytes(limit)?);
        }
        let mut files: Vec<BString> = run
            .lines_nulterm()?
            .iter()
            .map(|record| record.as_bstr().to_owned())
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Paths known to git under the given tree, resolved and
    /// repo-root-relative. Unknown path limits are an error.
    ///
    /// # Errors
    /// [`Error::Run`] when a path limit matches nothing.
    pub fn ls_files(&self, tree: &Tree, pathlimits: &[BString]) -> Result<Vec<BString>, Error> {
        if pathlimits.is_empty() {
            return Ok(Vec::new());
        }
        let with_tree = format!("--with-tree={}", tree.oid());
        let mut run = self.run([
            "ls-files",
            "-z",
            with_tree.as_str(),
            "--error-unmatch",
            "--full-name",
            "--",
        ]);
        for limit in pathlimits {
            run = run.arg(osstring_from_bytes(limit)?);
        }
        let mut files: Vec<BString> = run
            .lines_nulterm()?
            .iter()
            .map(|record| record.as_bstr().to_owned())
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Re-stage the given repo-root-relative paths from the worktree.
    ///
    /// # Errors
    /// [`Error::Run`] if `update-index` fails.
    pub fn update_index(&mut self, paths: &[BString]) -> Result<(), Error> {
        let mut input = Vec::new();
        for path in paths {
            input.extend_from_slice(path);
            input.push(0);
        }
        self.run(["update-index", "--remove", "-z", "--stdin"])
            .stdin_bytes(input)
            .ok()
    }

    /// Whether the worktree is clean relative to the index.
    ///
    /// # Errors
    /// [`Error::Io`] only.
    pub fn worktree_clean(&self) -> Result<bool, Error> {
        let (_, output) = self
            .run(["update-index", "--ignore-submodules", "--refresh"])
            .status()?;
        Ok(output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{add_commit, setup_repo};

    fn open(repo: &crate::testutil::TestRepo) -> Repository {
        Repository::open(repo.git_dir()).unwrap()
    }

    #[test]
    fn temp_index_reserves_and_cleans_up() {
        let tr = setup_repo();
        let repo = open(&tr);
        let path;
        {
            let mut index = repo.temp_index().unwrap();
            path = index.path().to_owned();
            assert!(!path.exists(), "only the name is reserved");
            let head = repo.rev_parse_tree("HEAD").unwrap();
            index.read_tree(&head).unwrap();
            assert!(path.exists(), "git created the index");
        }
        assert!(!path.exists(), "dropped index removes its file");
    }

    #[test]
    fn read_write_tree_round_trip() {
        let tr = setup_repo();
        let repo = open(&tr);
        let head = repo.rev_parse_tree("HEAD").unwrap();
        let mut index = repo.temp_index().unwrap();
        index.read_tree(&head).unwrap();
        let written = index.write_tree(&repo).unwrap();
        assert_eq!(written, head);
        assert!(index.is_clean(&head).unwrap());
    }

    #[test]
    fn merge_trivial_cases_skip_git() {
        let tr = setup_repo();
        let repo = open(&tr);
        let base = repo.rev_parse_tree("HEAD").unwrap();
        add_commit(&tr, "a.txt", "a\n", "add a");
        let ours = repo.rev_parse_tree("HEAD").unwrap();

        let mut index = repo.temp_index().unwrap();
        // base == ours → theirs; base == theirs → ours; ours == theirs → ours.
        let (r, hint) = index.merge(&repo, &base, &base, &ours, None).unwrap();
        assert_eq!(r, Some(ours.clone()));
        assert_eq!(hint, None, "trivial case leaves the hint untouched");
        let (r, _) = index.merge(&repo, &base, &ours, &base, None).unwrap();
        assert_eq!(r, Some(ours.clone()));
        let (r, _) = index.merge(&repo, &base, &ours, &ours, None).unwrap();
        assert_eq!(r, Some(ours.clone()));
        assert!(
            !index.path().exists(),
            "trivial merges never touch the index file"
        );
    }

    #[test]
    fn merge_disjoint_changes_unions() {
        let tr = setup_repo();
        let repo = open(&tr);
        let base = repo.rev_parse_tree("HEAD").unwrap();
        add_commit(&tr, "ours.txt", "ours\n", "ours");
        let ours = repo.rev_parse_tree("HEAD").unwrap();
        tr.git(&["reset", "-q", "--hard", "HEAD~1"]);
        add_commit(&tr, "theirs.txt", "theirs\n", "theirs");
        let theirs = repo.rev_parse_tree("HEAD").unwrap();

        let mut index = repo.temp_index().unwrap();
        let (result, hint) = index.merge(&repo, &base, &ours, &theirs, None).unwrap();
        let merged = result.expect("disjoint changes merge cleanly");
        assert_eq!(hint, Some(merged.clone()));
        let data = merged.data(&repo).unwrap();
        assert!(data.entry(b"ours.txt").is_some());
        assert!(data.entry(b"theirs.txt").is_some());
    }

    #[test]
    fn merge_conflicting_changes_fails_cleanly() {
        let tr = setup_repo();
        let repo = open(&tr);
        let base = repo.rev_parse_tree("HEAD").unwrap();
        add_commit(&tr, "f.txt", "ours\n", "ours");
        let ours = repo.rev_parse_tree("HEAD").unwrap();
        tr.git(&["reset", "-q", "--hard", "HEAD~1"]);
        add_commit(&tr, "f.txt", "theirs\n", "theirs");
        let theirs = repo.rev_parse_tree("HEAD").unwrap();

        let mut index = repo.temp_index().unwrap();
        let (result, hint) = index.merge(&repo, &base, &ours, &theirs, None).unwrap();
        assert_eq!(result, None);
        assert_eq!(hint, Some(ours), "failed merge leaves ours loaded");
    }

    #[test]
    fn worktree_merge_reports_conflict_lines() {
        let tr = setup_repo();
        let repo = open(&tr);
        let base = repo.rev_parse_tree("HEAD").unwrap();
        add_commit(&tr, "f.txt", "ours\n", "ours");
        let ours = repo.rev_parse_tree("HEAD").unwrap();
        tr.git(&["reset", "-q", "--hard", "HEAD~1"]);
        add_commit(&tr, "f.txt", "theirs\n", "theirs");
        let theirs = repo.rev_parse_tree("HEAD").unwrap();
        tr.git(&["reset", "-q", "--hard", "HEAD~1"]);
        tr.git(&["read-tree", "--reset", "-u", ours.oid().as_str()]);

        let mut iw = IndexAndWorktree::new(
            repo.default_index(),
            Worktree::new(tr.workdir()),
        );
        let err = iw.merge(&base, &ours, &theirs).unwrap_err();
        match err {
            Error::MergeConflicts { conflicts } => {
                assert!(!conflicts.is_empty());
                assert!(conflicts[0].starts_with("CONFLICT"));
            }
            other => panic!("expected MergeConflicts, got {other:?}"),
        }
        let unmerged = iw.index().conflicts().unwrap();
        assert_eq!(unmerged, vec![bstr::BString::from("f.txt")]);
    }

    #[test]
    fn checkout_dirty_is_refused() {
        let tr = setup_repo();
        let repo = open(&tr);
        let old = repo.rev_parse_tree("HEAD").unwrap();
        add_commit(&tr, "f.txt", "new\n", "new file");
        let new = repo.rev_parse_tree("HEAD").unwrap();
        tr.git(&["reset", "-q", "--hard", "HEAD~1"]);
        // Unstaged change that the two-tree switch would clobber.
        tr.write_file("f.txt", "local edit\n");

        let mut iw = IndexAndWorktree::new(
            repo.default_index(),
            Worktree::new(tr.workdir()),
        );
        let err = iw.checkout(&old, &new).unwrap_err();
        assert!(matches!(err, Error::CheckoutDirty));
    }
}
