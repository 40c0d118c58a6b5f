//! The stack model: ordered patch lists layered on a git branch.
//!
//! A [`Stack`] is a passive store. It maintains three pairwise-disjoint
//! ordered lists of patch names — `applied` (committed onto the branch
//! head, bottom to top), `unapplied`, and `hidden` — plus the map from
//! patch name to commit. All algorithmic work (pushing, popping,
//! reordering, merging) happens in [`transaction`], which snapshots this
//! store, stages changes, and writes them back atomically.
//!
//! # Ref layout
//!
//! ```text
//! refs/strata/<branch>/stack          ← snapshot chain (audit log)
//! refs/strata/<branch>/patches/<pn>   ← one ref per patch commit
//! ```

pub mod log;
pub(crate) mod state;
pub mod transaction;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strata_git::{Branch, Commit, Repository};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Ref names
// ---------------------------------------------------------------------------

/// Prefix for all strata-owned refs.
pub const STRATA_REF_PREFIX: &str = "refs/strata/";

/// The snapshot-chain ref for a branch's stack.
#[must_use]
pub fn stack_ref(branch: &str) -> String {
    format!("{STRATA_REF_PREFIX}{branch}/stack")
}

/// The per-patch ref holding a patch's current commit.
#[must_use]
pub fn patch_ref(branch: &str, name: &PatchName) -> String {
    format!("{STRATA_REF_PREFIX}{branch}/patches/{name}")
}

// ---------------------------------------------------------------------------
// PatchName
// ---------------------------------------------------------------------------

/// A validated patch name, safe to embed in a ref name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatchName(String);

impl PatchName {
    /// # Errors
    /// Returns [`Error::Stack`] when the name is empty, starts with `-`
    /// or `.`, contains `..`, or contains characters outside
    /// `[A-Za-z0-9._-]`.
    pub fn new(name: &str) -> Result<Self, Error> {
        let bad = |reason: &str| Error::Stack {
            message: format!("invalid patch name {name:?}: {reason}"),
        };
        if name.is_empty() {
            return Err(bad("empty"));
        }
        if name.starts_with('-') || name.starts_with('.') {
            return Err(bad("must not start with `-` or `.`"));
        }
        if name.contains("..") {
            return Err(bad("must not contain `..`"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(bad("allowed characters are A-Z a-z 0-9 - _ ."));
        }
        Ok(Self(name.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PatchName {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PatchName {
    type Error = Error;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<PatchName> for String {
    fn from(name: PatchName) -> Self {
        name.0
    }
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// The patch stack of one branch.
pub struct Stack<'repo> {
    repo: &'repo Repository,
    branch: Branch,
    applied: Vec<PatchName>,
    unapplied: Vec<PatchName>,
    hidden: Vec<PatchName>,
    patches: BTreeMap<PatchName, Commit>,
}

impl<'repo> Stack<'repo> {
    /// Record a new, empty stack for a branch.
    ///
    /// The base is the branch's current head. Fails if the branch already
    /// has a stack.
    ///
    /// # Errors
    /// [`Error::Stack`] if already initialized or the branch is missing.
    pub fn initialize(repo: &'repo Repository, branch_name: &str) -> Result<Self, Error> {
        let branch = Branch::open(repo, branch_name)?;
        if repo.refs().exists(&stack_ref(branch_name))? {
            return Err(Error::Stack {
                message: format!("branch `{branch_name}` already has a stack"),
            });
        }
        let stack = Self {
            repo,
            branch,
            applied: Vec::new(),
            unapplied: Vec::new(),
            hidden: Vec::new(),
            patches: BTreeMap::new(),
        };
        log::log_entry(&stack, "initialise")?;
        Ok(stack)
    }

    /// Load a branch's stack from its most recent snapshot.
    ///
    /// # Errors
    /// [`Error::Stack`] when the branch has no stack;
    /// [`Error::CorruptState`] when the snapshot does not parse or its
    /// lists overlap.
    pub fn open(repo: &'repo Repository, branch_name: &str) -> Result<Self, Error> {
        let branch = Branch::open(repo, branch_name)?;
        let state = log::read_snapshot(repo, branch_name)?.ok_or_else(|| Error::Stack {
            message: format!("branch `{branch_name}` has no stack (initialize it first)"),
        })?;

        let mut patches = BTreeMap::new();
        let mut load = |records: &[state::PatchRecord]| -> Result<Vec<PatchName>, Error> {
            let mut names = Vec::with_capacity(records.len());
            for record in records {
                let commit = repo.get_commit(&record.oid);
                if patches.insert(record.name.clone(), commit).is_some() {
                    return Err(Error::CorruptState {
                        branch: branch_name.to_owned(),
                        message: format!("patch `{}` appears twice", record.name),
                    });
                }
                names.push(record.name.clone());
            }
            Ok(names)
        };
        let applied = load(&state.applied)?;
        let unapplied = load(&state.unapplied)?;
        let hidden = load(&state.hidden)?;
        Ok(Self {
            repo,
            branch,
            applied,
            unapplied,
            hidden,
            patches,
        })
    }

    #[must_use]
    pub fn repo(&self) -> &'repo Repository {
        self.repo
    }

    #[must_use]
    pub fn branch(&self) -> &Branch {
        &self.branch
    }

    #[must_use]
    pub fn applied(&self) -> &[PatchName] {
        &self.applied
    }

    #[must_use]
    pub fn unapplied(&self) -> &[PatchName] {
        &self.unapplied
    }

    #[must_use]
    pub fn hidden(&self) -> &[PatchName] {
        &self.hidden
    }

    /// All patch names: applied, then unapplied, then hidden.
    #[must_use]
    pub fn all_patches(&self) -> Vec<PatchName> {
        let mut all = self.applied.clone();
        all.extend_from_slice(&self.unapplied);
        all.extend_from_slice(&self.hidden);
        all
    }

    #[must_use]
    pub fn has_patch(&self, name: &PatchName) -> bool {
        self.patches.contains_key(name)
    }

    /// The commit a patch points at.
    #[must_use]
    pub fn patch_commit(&self, name: &PatchName) -> Option<&Commit> {
        self.patches.get(name)
    }

    /// The branch's actual head commit.
    ///
    /// # Errors
    /// Propagates ref lookup failures.
    pub fn branch_head(&self) -> Result<Commit, Error> {
        Ok(self.branch.head(self.repo)?)
    }

    /// The topmost applied patch's commit, or the base when nothing is
    /// applied.
    ///
    /// # Errors
    /// [`Error::Internal`] when the lists and patch map disagree.
    pub fn top(&self) -> Result<Commit, Error> {
        match self.applied.last() {
            Some(name) => self.patch_commit(name).cloned().ok_or_else(|| Error::Internal {
                message: format!("applied patch `{name}` not in the patch map"),
            }),
            None => self.base(),
        }
    }

    /// The commit below the bottommost applied patch. With nothing
    /// applied this is the branch head itself.
    ///
    /// # Errors
    /// [`Error::Internal`] when the bottom patch has no single parent.
    pub fn base(&self) -> Result<Commit, Error> {
        match self.applied.first() {
            Some(name) => {
                let commit = self.patch_commit(name).ok_or_else(|| Error::Internal {
                    message: format!("applied patch `{name}` not in the patch map"),
                })?;
                let data = commit.data(self.repo).map_err(Error::Git)?;
                data.parent().cloned().ok_or_else(|| Error::Internal {
                    message: format!("patch `{name}` does not have exactly one parent"),
                })
            }
            None => self.branch_head(),
        }
    }

    /// Whether the branch head and the stack top agree. External tooling
    /// moving the branch breaks this; transactions refuse to start until
    /// it is repaired (or explicitly overridden).
    ///
    /// # Errors
    /// Propagates ref lookup failures.
    pub fn head_top_equal(&self) -> Result<bool, Error> {
        Ok(self.branch_head()? == self.top()?)
    }

    // -----------------------------------------------------------------------
    // Writeback (used by the transaction's terminal phase)
    // -----------------------------------------------------------------------

    /// Create or repoint a patch's ref and map entry.
    pub(crate) fn write_patch(
        &mut self,
        name: &PatchName,
        commit: Commit,
        msg: &str,
    ) -> Result<(), Error> {
        self.repo
            .refs()
            .set(&patch_ref(self.branch.name(), name), commit.oid(), msg)?;
        self.patches.insert(name.clone(), commit);
        Ok(())
    }

    /// Drop a patch's ref and map entry.
    pub(crate) fn delete_patch(&mut self, name: &PatchName) -> Result<(), Error> {
        self.repo.refs().delete(&patch_ref(self.branch.name(), name))?;
        self.patches.remove(name);
        Ok(())
    }

    /// Install new orderings. The transaction has already validated
    /// disjointness and coverage.
    pub(crate) fn set_order(
        &mut self,
        applied: Vec<PatchName>,
        unapplied: Vec<PatchName>,
        hidden: Vec<PatchName>,
    ) {
        debug_assert!({
            let mut all: Vec<_> = applied
                .iter()
                .chain(&unapplied)
                .chain(&hidden)
                .collect();
            all.sort();
            let len = all.len();
            all.dedup();
            all.len() == len
        });
        self.applied = applied;
        self.unapplied = unapplied;
        self.hidden = hidden;
    }

    /// Advance the branch head ref.
    pub(crate) fn set_head(&mut self, commit: &Commit, msg: &str) -> Result<(), Error> {
        Ok(self.branch.set_head(self.repo, commit, msg)?)
    }
}

impl fmt::Debug for Stack<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("branch", &self.branch.name())
            .field("applied", &self.applied)
            .field("unapplied", &self.unapplied)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}
