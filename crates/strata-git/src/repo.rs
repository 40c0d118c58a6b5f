//! The repository façade.
//!
//! One [`Repository`] handle per git repository owns the object intern
//! caches, the ref cache, and the two long-lived helper subprocesses
//! (`cat-file --batch`, `diff-tree --stdin`). Everything in the crate
//! funnels through it. No cross-handle sharing: callers serialize their
//! own access, matching the single-threaded engine above.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};

use crate::catfile::CatFileProcess;
use crate::difftree::DiffTreeProcesses;
use crate::error::Error;
use crate::index::{Index, Worktree};
use crate::object::{Blob, Commit, CommitData, ObjectKind, Tree};
use crate::oid::Oid;
use crate::refs::RefStore;
use crate::run::GitRun;

pub struct Repository {
    git_dir: PathBuf,
    common_dir: PathBuf,
    refs: RefStore,
    blobs: RefCell<HashMap<Oid, Blob>>,
    trees: RefCell<HashMap<Oid, Tree>>,
    commits: RefCell<HashMap<Oid, Commit>>,
    catfile: CatFileProcess,
    difftree: DiffTreeProcesses,
}

impl Repository {
    /// Open a repository at a known git-dir.
    ///
    /// The common-dir is read from the `commondir` file when this is a
    /// linked worktree's private git-dir.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the directory does not exist.
    pub fn open(git_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let git_dir = git_dir.into();
        if !git_dir.is_dir() {
            return Err(Error::NotFound {
                message: format!("no git repository at {}", git_dir.display()),
            });
        }
        let common_dir = match std::fs::read_to_string(git_dir.join("commondir")) {
            Ok(rel) => {
                let rel = rel.trim_end();
                let path = PathBuf::from(rel);
                let joined = if path.is_absolute() {
                    path
                } else {
                    git_dir.join(path)
                };
                // commondir is usually a relative "../.."; resolve it.
                joined.canonicalize().unwrap_or(joined)
            }
            Err(_) => git_dir.clone(),
        };
        Ok(Self {
            refs: RefStore::new(&git_dir),
            catfile: CatFileProcess::new(&git_dir),
            difftree: DiffTreeProcesses::new(&git_dir),
            blobs: RefCell::new(HashMap::new()),
            trees: RefCell::new(HashMap::new()),
            commits: RefCell::new(HashMap::new()),
            git_dir,
            common_dir,
        })
    }

    /// Open the repository containing the current directory.
    ///
    /// # Errors
    /// [`Error::NotFound`] when not inside a git repository.
    pub fn discover() -> Result<Self, Error> {
        let git_dir = GitRun::new(["rev-parse", "--git-dir"])
            .one_line()
            .map_err(|_| Error::NotFound {
                message: "cannot find git repository".to_owned(),
            })?;
        Self::open(git_dir)
    }

    #[must_use]
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    #[must_use]
    pub fn common_dir(&self) -> &Path {
        &self.common_dir
    }

    #[must_use]
    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    /// A pre-configured runner carrying this repository's environment.
    pub(crate) fn run<I, S>(&self, args: I) -> GitRun
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        GitRun::new(args).env("GIT_DIR", &self.git_dir)
    }

    // -----------------------------------------------------------------------
    // Object lookup and interning
    // -----------------------------------------------------------------------

    /// The interned blob handle for an OID.
    #[must_use]
    pub fn get_blob(&self, oid: &Oid) -> Blob {
        self.blobs
            .borrow_mut()
            .entry(oid.clone())
            .or_insert_with(|| Blob::new(oid.clone()))
            .clone()
    }

    /// The interned tree handle for an OID.
    #[must_use]
    pub fn get_tree(&self, oid: &Oid) -> Tree {
        self.trees
            .borrow_mut()
            .entry(oid.clone())
            .or_insert_with(|| Tree::new(oid.clone()))
            .clone()
    }

    /// The interned commit handle for an OID.
    #[must_use]
    pub fn get_commit(&self, oid: &Oid) -> Commit {
        self.commits
            .borrow_mut()
            .entry(oid.clone())
            .or_insert_with(|| Commit::new(oid.clone()))
            .clone()
    }

    /// Intern an object of a known kind without returning it.
    pub(crate) fn intern(&self, kind: ObjectKind, oid: &Oid) {
        match kind {
            ObjectKind::Blob => {
                self.get_blob(oid);
            }
            ObjectKind::Tree => {
                self.get_tree(oid);
            }
            ObjectKind::Commit => {
                self.get_commit(oid);
            }
        }
    }

    /// Read an object's type and payload through the batch helper.
    ///
    /// # Errors
    /// [`Error::NotFound`] for missing objects.
    pub fn cat_object(&self, oid: &Oid) -> Result<(ObjectKind, Vec<u8>), Error> {
        self.catfile.cat_file(oid)
    }

    /// Resolve a revision to a commit via `rev-parse '<rev>^{commit}'`.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the revision does not name a commit.
    pub fn rev_parse_commit(&self, rev: &str) -> Result<Commit, Error> {
        let oid = self.rev_parse(rev, ObjectKind::Commit)?;
        Ok(self.get_commit(&oid))
    }

    /// Resolve a revision to a tree via `rev-parse '<rev>^{tree}'`.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the revision does not name a tree.
    pub fn rev_parse_tree(&self, rev: &str) -> Result<Tree, Error> {
        let oid = self.rev_parse(rev, ObjectKind::Tree)?;
        Ok(self.get_tree(&oid))
    }

    fn rev_parse(&self, rev: &str, kind: ObjectKind) -> Result<Oid, Error> {
        let spec = format!("{rev}^{{{kind}}}");
        let line = self
            .run(["rev-parse", "--verify", "-q", spec.as_str()])
            .one_line()
            .map_err(|_| Error::NotFound {
                message: format!("{rev}: no such {kind}"),
            })?;
        Oid::new(&line)
    }

    // -----------------------------------------------------------------------
    // Object construction
    // -----------------------------------------------------------------------

    /// Write a blob and return the interned handle.
    ///
    /// # Errors
    /// [`Error::Run`] if `hash-object` fails.
    pub fn write_blob(&self, bytes: impl Into<Vec<u8>>) -> Result<Blob, Error> {
        let line = self
            .run(["hash-object", "-w", "--stdin"])
            .stdin_bytes(bytes.into())
            .one_line()?;
        Ok(self.get_blob(&Oid::new(&line)?))
    }

    pub(crate) fn mktree(&self, listing: Vec<u8>) -> Result<Tree, Error> {
        let line = self
            .run(["mktree", "-z"])
            .stdin_bytes(listing)
            .one_line()?;
        Ok(self.get_tree(&Oid::new(&line)?))
    }

    pub(crate) fn commit_tree(&self, data: &CommitData) -> Result<Commit, Error> {
        let mut run = self.run(["commit-tree", data.tree.oid().as_str()]);
        for parent in &data.parents {
            run = run.arg("-p").arg(parent.oid().as_str());
        }
        // Identity travels through the environment; absent fields fall
        // back to git's own resolution (env, then config), and a missing
        // date is stamped by commit-tree itself.
        if let Some(author) = &data.author {
            run = run.envs(author.env_vars("AUTHOR")?);
        }
        if let Some(committer) = &data.committer {
            run = run.envs(committer.env_vars("COMMITTER")?);
        }
        let line = run.stdin_bytes(data.message.to_vec()).one_line()?;
        Ok(self.get_commit(&Oid::new(&line)?))
    }

    // -----------------------------------------------------------------------
    // Tree listings and diffs
    // -----------------------------------------------------------------------

    /// Zero-terminated `ls-tree` records for a tree.
    pub(crate) fn ls_tree(&self, oid: &Oid) -> Result<Vec<Vec<u8>>, Error> {
        self.run(["ls-tree", "-z", oid.as_str()]).lines_nulterm()
    }

    /// Patch text taking `t1` to `t2` (`--patch`, plus `--binary` unless
    /// suppressed).
    ///
    /// # Errors
    /// Propagates helper failures.
    pub fn diff_tree_patch(
        &self,
        t1: &Tree,
        t2: &Tree,
        diff_opts: &[&str],
        binary: bool,
    ) -> Result<Vec<u8>, Error> {
        let mut args = vec!["--patch"];
        if binary && !diff_opts.contains(&"--binary") {
            args.push("--binary");
        }
        args.extend_from_slice(diff_opts);
        self.difftree.diff_trees(&args, t1.oid(), t2.oid())
    }

    /// `--stat --summary` output between two trees.
    ///
    /// # Errors
    /// Propagates helper failures.
    pub fn diff_tree_stat(&self, t1: &Tree, t2: &Tree) -> Result<Vec<u8>, Error> {
        self.difftree
            .diff_trees(&["--stat", "--summary"], t1.oid(), t2.oid())
    }

    /// Machine-readable per-file records between two trees (`-r -z`).
    ///
    /// # Errors
    /// [`Error::Run`] on malformed records.
    pub fn diff_tree_files(&self, t1: &Tree, t2: &Tree) -> Result<Vec<FileDiff>, Error> {
        let raw = self.difftree.diff_trees(&["-r", "-z"], t1.oid(), t2.oid())?;
        let mut files = Vec::new();
        let mut records = raw.split(|&b| b == 0).filter(|r| !r.is_empty());
        while let Some(meta) = records.next() {
            let bad = || Error::Run {
                command: "git diff-tree -r -z".to_owned(),
                stderr: format!("malformed record {:?}", meta.as_bstr()),
                exit_code: None,
            };
            let meta = meta.strip_prefix(b":").ok_or_else(bad)?;
            let fields: Vec<&[u8]> = meta.splitn_str(5, b" ").collect();
            let [old_mode, new_mode, old_oid, new_oid, status] = fields.as_slice() else {
                return Err(bad());
            };
            let status = status.to_str().map_err(|_| bad())?.to_owned();
            let old_path: BString = records.next().ok_or_else(bad)?.as_bstr().to_owned();
            let new_path = if status.starts_with('C') || status.starts_with('R') {
                records.next().ok_or_else(bad)?.as_bstr().to_owned()
            } else {
                old_path.clone()
            };
            files.push(FileDiff {
                old_mode: old_mode.as_bstr().to_owned(),
                new_mode: new_mode.as_bstr().to_owned(),
                old_blob: self.get_blob(&Oid::from_output(old_oid)?),
                new_blob: self.get_blob(&Oid::from_output(new_oid)?),
                status,
                old_path,
                new_path,
            });
        }
        Ok(files)
    }

    /// Paths of submodule entries anywhere under a tree.
    ///
    /// # Errors
    /// Propagates `ls-tree` failures.
    pub fn submodules(&self, tree: &Tree) -> Result<Vec<BString>, Error> {
        let records = self
            .run(["ls-tree", "-d", "-r", "-z", tree.oid().as_str()])
            .lines_nulterm()?;
        let mut paths = Vec::new();
        for record in records {
            let Some((meta, path)) = record.split_once_str(b"\t") else {
                continue;
            };
            if meta.starts_with(b"160000 commit ") {
                paths.push(path.as_bstr().to_owned());
            }
        }
        Ok(paths)
    }

    // -----------------------------------------------------------------------
    // HEAD and history
    // -----------------------------------------------------------------------

    /// The ref HEAD points at.
    ///
    /// # Errors
    /// [`Error::DetachedHead`] when HEAD is not symbolic.
    pub fn head_ref(&self) -> Result<String, Error> {
        self.run(["symbolic-ref", "-q", "HEAD"])
            .one_line()
            .map_err(|_| Error::DetachedHead)
    }

    /// Point HEAD at another ref.
    ///
    /// # Errors
    /// [`Error::Run`] if git refuses.
    pub fn set_head_ref(&self, ref_name: &str, msg: &str) -> Result<(), Error> {
        self.run(["symbolic-ref", "-m", msg, "HEAD", ref_name]).ok()
    }

    /// The current branch's short name.
    ///
    /// # Errors
    /// [`Error::DetachedHead`] when HEAD is not symbolic.
    pub fn current_branch_name(&self) -> Result<String, Error> {
        let head = self.head_ref()?;
        Ok(head
            .strip_prefix("refs/heads/")
            .unwrap_or(&head)
            .to_owned())
    }

    /// All merge bases of two commits (`merge-base --all`).
    ///
    /// # Errors
    /// [`Error::Run`] if git fails.
    pub fn merge_bases(&self, a: &Commit, b: &Commit) -> Result<Vec<Commit>, Error> {
        let lines = self
            .run(["merge-base", "--all", a.oid().as_str(), b.oid().as_str()])
            .lines()?;
        lines
            .iter()
            .map(|line| Ok(self.get_commit(&Oid::new(line)?)))
            .collect()
    }

    /// `describe --all` for a commit; empty on no match.
    ///
    /// # Errors
    /// [`Error::Io`] only; a failed describe yields an empty string.
    pub fn describe(&self, commit: &Commit) -> Result<String, Error> {
        let (_, output) = self
            .run(["describe", "--all", commit.oid().as_str()])
            .status()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    // -----------------------------------------------------------------------
    // Index and worktree factories
    // -----------------------------------------------------------------------

    /// The repository's default index (`GIT_INDEX_FILE` or
    /// `<git-dir>/index`).
    #[must_use]
    pub fn default_index(&self) -> Index {
        let path = std::env::var_os("GIT_INDEX_FILE")
            .map_or_else(|| self.git_dir.join("index"), PathBuf::from);
        Index::new(&self.git_dir, path)
    }

    /// A fresh uniquely-named temporary index inside the git-dir, removed
    /// when dropped.
    ///
    /// # Errors
    /// [`Error::Io`] if the file cannot be created.
    pub fn temp_index(&self) -> Result<Index, Error> {
        Index::temp(&self.git_dir)
    }

    /// The default worktree: `GIT_WORK_TREE`, or the toplevel directory
    /// when running inside a checkout.
    ///
    /// # Errors
    /// [`Error::NotFound`] when neither is available (bare repository).
    pub fn default_worktree(&self) -> Result<Worktree, Error> {
        if let Some(path) = std::env::var_os("GIT_WORK_TREE") {
            return Ok(Worktree::new(path));
        }
        let toplevel = self
            .run(["rev-parse", "--show-toplevel"])
            .one_line()
            .map_err(|_| Error::NotFound {
                message: "no worktree (bare repository?)".to_owned(),
            })?;
        Ok(Worktree::new(toplevel))
    }

    // -----------------------------------------------------------------------
    // Convenience merges
    // -----------------------------------------------------------------------

    /// Index-only three-way merge in a throwaway temporary index.
    ///
    /// Returns the merged tree, or `None` when the merge fails cleanly.
    ///
    /// # Errors
    /// Propagates non-merge failures.
    pub fn simple_merge(
        &self,
        base: &Tree,
        ours: &Tree,
        theirs: &Tree,
    ) -> Result<Option<Tree>, Error> {
        let mut index = self.temp_index()?;
        let (result, _) = index.merge(self, base, ours, theirs, None)?;
        index.delete();
        Ok(result)
    }

    /// Apply raw patch bytes to a tree through a throwaway index.
    ///
    /// Returns the patched tree, or `None` when the patch does not apply.
    /// Empty patch bytes return the input tree unchanged.
    ///
    /// # Errors
    /// Propagates non-merge failures.
    pub fn apply_patch(
        &self,
        tree: &Tree,
        patch_bytes: &[u8],
        quiet: bool,
    ) -> Result<Option<Tree>, Error> {
        if patch_bytes.is_empty() {
            return Ok(Some(tree.clone()));
        }
        let mut index = self.temp_index()?;
        index.read_tree(tree)?;
        let result = match index
            .apply(patch_bytes, quiet)
            .and_then(|()| index.write_tree(self))
        {
            Ok(tree) => Ok(Some(tree)),
            Err(err) if err.is_merge_failure() => Ok(None),
            Err(err) => Err(err),
        };
        index.delete();
        result
    }

    /// Shut down the pooled helpers explicitly (also happens on drop).
    pub fn shutdown(&self) {
        self.catfile.shutdown();
        self.difftree.shutdown();
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Repository<{}>", self.git_dir.display())
    }
}

/// One changed file from a `-r -z` tree diff.
///
/// Modes are kept raw (`000000` marks creation/deletion, which is not a
/// tree entry mode). Old and new paths differ only for copies and renames.
#[derive(Clone, Debug)]
pub struct FileDiff {
    pub old_mode: BString,
    pub new_mode: BString,
    pub old_blob: Blob,
    pub new_blob: Blob,
    pub status: String,
    pub old_path: BString,
    pub new_path: BString,
}

impl FileDiff {
    /// The path limit both sides agree on for unchanged-name statuses.
    #[must_use]
    pub fn path(&self) -> &BStr {
        self.new_path.as_bstr()
    }
}
