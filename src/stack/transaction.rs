//! Atomic stack mutations.
//!
//! A [`StackTransaction`] makes complex stack updates all-or-nothing.
//! Operations like [`push_patch`](StackTransaction::push_patch) and
//! [`pop_patches`](StackTransaction::pop_patches) work against snapshots
//! taken at construction plus an override map of staged patch changes;
//! they may create git objects (objects are cheap and garbage-collected
//! by git), but never write a ref. A failed setup can simply be dropped.
//!
//! The terminal [`run`](StackTransaction::run) then either persists
//! everything — worktree checkout, branch ref, patch refs, ordering,
//! audit log entry — or fails having changed nothing on disk.
//!
//! A push that hits conflicts is special: the operation returns the
//! [`Error::Halted`] control signal and the caller stops staging, but
//! `run()` still executes, spilling the conflicts into the worktree and
//! recording the patch as applied with its pre-merge tree under a log
//! message suffixed `(CONFLICT)`.
//!
//! ```no_run
//! # use strata::{PatchName, Stack, StackTransaction, TransactionOptions, Error};
//! # fn demo(stack: &mut Stack<'_>) -> Result<(), Error> {
//! let pn: PatchName = "my-patch".parse()?;
//! let mut trans = StackTransaction::new(stack, "push my-patch", TransactionOptions::default())?;
//! match trans.push_patch(&pn, None) {
//!     Ok(()) => {}
//!     Err(err) if err.is_halt() => {} // recorded; run() reports it
//!     Err(err) => return Err(err),
//! }
//! trans.run(None)?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use strata_git::{Commit, Index, IndexAndWorktree, Tree};
use tracing::{error, info};

use crate::error::{Error, EXIT_CONFLICT, EXIT_SUCCESS};
use crate::stack::{log, PatchName, Stack};

/// Options fixed at transaction construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransactionOptions {
    /// Discard index and worktree changes instead of carrying them along.
    pub discard_changes: bool,
    /// Allow the terminal checkout even with unresolved index conflicts.
    pub allow_conflicts: bool,
    /// Skip the HEAD/top agreement check (repair tooling only).
    pub allow_bad_head: bool,
}

/// Options for the terminal [`StackTransaction::run_with`].
#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    /// Advance the branch head (and check out its tree).
    pub set_head: bool,
    /// Permit a diverged HEAD during the terminal checkout.
    pub allow_bad_head: bool,
    /// Report the resulting "Now at patch" transition.
    pub print_current: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            set_head: true,
            allow_bad_head: false,
            print_current: true,
        }
    }
}

/// What the terminal phase recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Every staged operation landed.
    Clean,
    /// A push spilled conflicts; the stack records the conflicted patch
    /// and the worktree holds the conflict markers.
    Conflict,
}

impl TransactionOutcome {
    /// Exit code for wrapping callers: 0 clean, 3 conflict.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Clean => EXIT_SUCCESS,
            Self::Conflict => EXIT_CONFLICT,
        }
    }
}

/// A push whose list update was deferred because it conflicted: replayed
/// after the first writeback pass so the conflicted state lands under its
/// own `(CONFLICT)` log entry.
#[derive(Debug)]
struct PendingPush {
    patch: PatchName,
    commit: Option<Commit>,
}

const HEAD_TOP_MISMATCH: &str =
    "HEAD and stack top are not the same; this can happen when the branch is \
     modified with plain git";

/// A staged set of stack mutations plus the terminal commit phase.
#[derive(Debug)]
pub struct StackTransaction<'a, 'repo> {
    stack: &'a mut Stack<'repo>,
    msg: String,
    /// Staged patch changes; `None` is a tombstone. Reads fall through to
    /// the live stack for absent names.
    patches: BTreeMap<PatchName, Option<Commit>>,
    applied: Vec<PatchName>,
    unapplied: Vec<PatchName>,
    hidden: Vec<PatchName>,
    base: Commit,
    /// The tree currently checked out in the collaborating worktree.
    current_tree: Tree,
    error: Option<String>,
    conflicting_push: Option<PendingPush>,
    discard_changes: bool,
    allow_conflicts: bool,
    bad_head: Option<Commit>,
    temp_index: Option<Index>,
    temp_index_tree: Option<Tree>,
}

impl<'a, 'repo> StackTransaction<'a, 'repo> {
    /// Start a transaction against a stack.
    ///
    /// # Errors
    /// [`Error::Transaction`] when HEAD and the stack top diverge and
    /// `allow_bad_head` is not set.
    pub fn new(
        stack: &'a mut Stack<'repo>,
        msg: &str,
        options: TransactionOptions,
    ) -> Result<Self, Error> {
        if !options.allow_bad_head && !stack.head_top_equal()? {
            return Err(Error::Transaction {
                message: HEAD_TOP_MISMATCH.to_owned(),
            });
        }
        let repo = stack.repo();
        let current_tree = stack.branch_head()?.tree(repo).map_err(Error::Git)?;
        let base = stack.base()?;
        Ok(Self {
            applied: stack.applied().to_vec(),
            unapplied: stack.unapplied().to_vec(),
            hidden: stack.hidden().to_vec(),
            stack,
            msg: msg.to_owned(),
            patches: BTreeMap::new(),
            base,
            current_tree,
            error: None,
            conflicting_push: None,
            discard_changes: options.discard_changes,
            allow_conflicts: options.allow_conflicts,
            bad_head: None,
            temp_index: None,
            temp_index_tree: None,
        })
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

    /// All staged patch names: applied, then unapplied, then hidden.
    #[must_use]
    pub fn all_patches(&self) -> Vec<PatchName> {
        let mut all = self.applied.clone();
        all.extend_from_slice(&self.unapplied);
        all.extend_from_slice(&self.hidden);
        all
    }

    /// A patch's commit as this transaction sees it: the override map
    /// first, then the live stack. `None` for tombstoned patches.
    #[must_use]
    pub fn patch_commit(&self, name: &PatchName) -> Option<Commit> {
        match self.patches.get(name) {
            Some(staged) => staged.clone(),
            None => self.stack.patch_commit(name).cloned(),
        }
    }

    fn live_patch_commit(&self, name: &PatchName) -> Result<Commit, Error> {
        self.patch_commit(name).ok_or_else(|| Error::Internal {
            message: format!("no such patch `{name}`"),
        })
    }

    /// The staged stack top: the last applied patch's commit, or the
    /// base.
    ///
    /// # Errors
    /// [`Error::Internal`] when the staged lists are inconsistent.
    pub fn top(&self) -> Result<Commit, Error> {
        match self.applied.last() {
            Some(name) => self.live_patch_commit(name),
            None => Ok(self.base.clone()),
        }
    }

    /// The head the terminal phase will install: the staged top, unless a
    /// known-divergent head was set for repair.
    ///
    /// # Errors
    /// As [`StackTransaction::top`].
    pub fn head(&self) -> Result<Commit, Error> {
        match &self.bad_head {
            Some(head) => Ok(head.clone()),
            None => self.top(),
        }
    }

    /// Commit a known-divergent head (repair mode).
    pub fn set_head(&mut self, commit: Commit) {
        self.bad_head = Some(commit);
    }

    /// Reassign the stack base.
    ///
    /// # Errors
    /// [`Error::Internal`] unless the bottom applied patch (if any) has
    /// the new base as its parent.
    pub fn set_base(&mut self, commit: Commit) -> Result<(), Error> {
        if let Some(first) = self.applied.first() {
            let data = self
                .live_patch_commit(first)?
                .data(self.stack.repo())
                .map_err(Error::Git)?;
            if data.parent() != Some(&commit) {
                return Err(Error::Internal {
                    message: format!(
                        "new base {} is not the parent of bottom patch `{first}`",
                        commit.oid()
                    ),
                });
            }
        }
        self.base = commit;
        Ok(())
    }

    /// Record a halt: the transaction stops staging but `run()` will
    /// still persist the partial state.
    fn halt(&mut self, msg: impl Into<String>) -> Error {
        let message = msg.into();
        self.error = Some(message.clone());
        Error::Halted { message }
    }

    fn temp_index(&mut self) -> Result<&mut Index, Error> {
        if self.temp_index.is_none() {
            self.temp_index = Some(self.stack.repo().temp_index().map_err(Error::Git)?);
        }
        self.temp_index.as_mut().ok_or_else(|| Error::Internal {
            message: "temporary index unavailable".to_owned(),
        })
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Stage a brand-new patch as the stack top.
    ///
    /// # Errors
    /// [`Error::Stack`] when the name is taken.
    pub fn new_applied(&mut self, name: &PatchName, commit: Commit) -> Result<(), Error> {
        self.check_fresh(name)?;
        self.patches.insert(name.clone(), Some(commit));
        self.applied.push(name.clone());
        Ok(())
    }

    /// Stage a brand-new patch at the front of the unapplied list (the
    /// next push candidate).
    ///
    /// # Errors
    /// [`Error::Stack`] when the name is taken.
    pub fn new_unapplied(&mut self, name: &PatchName, commit: Commit) -> Result<(), Error> {
        self.check_fresh(name)?;
        self.patches.insert(name.clone(), Some(commit));
        self.unapplied.insert(0, name.clone());
        Ok(())
    }

    /// Repoint an existing patch at a new commit.
    ///
    /// # Errors
    /// [`Error::Stack`] when the patch does not exist (or is staged for
    /// deletion).
    pub fn update_patch(&mut self, name: &PatchName, commit: Commit) -> Result<(), Error> {
        if self.patch_commit(name).is_none() {
            return Err(Error::Stack {
                message: format!("no such patch `{name}`"),
            });
        }
        self.patches.insert(name.clone(), Some(commit));
        Ok(())
    }

    fn check_fresh(&self, name: &PatchName) -> Result<(), Error> {
        if self.patch_commit(name).is_some() {
            return Err(Error::Stack {
                message: format!("patch `{name}` already exists"),
            });
        }
        Ok(())
    }

    /// Pop every applied patch matching the predicate, plus whatever sat
    /// above the lowest match. Returns the incidental pops — the
    /// non-matching patches that had to come off too. Never fails.
    pub fn pop_patches(&mut self, pred: impl Fn(&PatchName) -> bool) -> Vec<PatchName> {
        let popped = match self.applied.iter().position(|pn| pred(pn)) {
            Some(i) => self.applied.split_off(i),
            None => Vec::new(),
        };
        let popped_no: Vec<PatchName> = popped.iter().filter(|pn| !pred(pn)).cloned().collect();
        let popped_yes: Vec<PatchName> = popped.iter().filter(|pn| pred(pn)).cloned().collect();
        let mut unapplied = popped_no.clone();
        unapplied.extend(popped_yes);
        unapplied.append(&mut self.unapplied);
        self.unapplied = unapplied;
        Self::print_popped(&popped);
        popped_no
    }

    /// Delete every patch matching the predicate, wherever it lives.
    /// Applied matches are popped first; non-matching patches above them
    /// move to unapplied and are returned.
    ///
    /// # Errors
    /// Propagates object reads (for the `(empty)` annotation).
    pub fn delete_patches(
        &mut self,
        pred: impl Fn(&PatchName) -> bool,
        quiet: bool,
    ) -> Result<Vec<PatchName>, Error> {
        let all = self.all_patches();
        let popped = match self.applied.iter().position(|pn| pred(pn)) {
            Some(i) => self.applied.split_off(i),
            None => Vec::new(),
        };
        let popped: Vec<PatchName> = popped.into_iter().filter(|pn| !pred(pn)).collect();
        let mut unapplied = popped.clone();
        unapplied.extend(self.unapplied.iter().filter(|pn| !pred(pn)).cloned());
        self.unapplied = unapplied;
        self.hidden.retain(|pn| !pred(pn));
        Self::print_popped(&popped);
        for pn in &all {
            if pred(pn) {
                let empty = self
                    .live_patch_commit(pn)?
                    .data(self.stack.repo())
                    .map_err(Error::Git)?
                    .is_nochange(self.stack.repo())
                    .map_err(Error::Git)?;
                self.patches.insert(pn.clone(), None);
                if !quiet {
                    let suffix = if empty { " (empty)" } else { "" };
                    info!("Deleted {pn}{suffix}");
                }
            }
        }
        Ok(popped)
    }

    /// Push a patch: rebase its commit onto the staged top, three-way
    /// merging its changes in a temporary index, and append it to
    /// applied.
    ///
    /// Without an index-and-worktree, a non-trivial merge failure halts
    /// with "does not apply cleanly". With one, the merge is retried
    /// through git's recursive driver, spilling conflicts into the
    /// worktree; the patch is then recorded with the pre-merge tree and
    /// the transaction halts with "Merge conflict".
    ///
    /// # Errors
    /// [`Error::Halted`] on halts; real errors otherwise.
    pub fn push_patch(
        &mut self,
        name: &PatchName,
        mut iw: Option<&mut IndexAndWorktree>,
    ) -> Result<(), Error> {
        let repo = self.stack.repo();
        let orig_commit = self.live_patch_commit(name)?;
        let orig_cd = orig_commit.data(repo).map_err(Error::Git)?;
        // The committer is re-stamped on rewrite.
        let mut cd = (*orig_cd).clone().set_committer(None);
        let old_parent = cd.parent().cloned().ok_or_else(|| Error::Internal {
            message: format!("patch `{name}` does not have exactly one parent"),
        })?;
        let new_parent = self.top()?;
        cd = cd.set_parent(new_parent.clone());

        let base = old_parent.tree(repo).map_err(Error::Git)?;
        let ours = new_parent.tree(repo).map_err(Error::Git)?;
        let theirs = cd.tree.clone();

        let hint = self.temp_index_tree.clone();
        let (merged, new_hint) = self
            .temp_index()?
            .merge(repo, &base, &ours, &theirs, hint.as_ref())
            .map_err(Error::Git)?;
        self.temp_index_tree = new_hint;

        let mut suffix = "";
        let mut merge_conflict = false;
        let tree = if let Some(tree) = merged {
            tree
        } else {
            // The index-only merge failed cleanly; spill into the
            // worktree if we were given one.
            let Some(iw) = iw.as_deref_mut() else {
                return Err(self.halt(format!("{name} does not apply cleanly")));
            };
            if let Err(err) = self.checkout(&ours, Some(&mut *iw), false) {
                return Err(match err {
                    Error::Git(strata_git::Error::CheckoutDirty) => {
                        self.halt("Index/worktree dirty")
                    }
                    other => other,
                });
            }
            match iw.merge(&base, &ours, &theirs) {
                Ok(()) => {
                    let tree = iw.index_mut().write_tree(repo).map_err(Error::Git)?;
                    self.current_tree = tree.clone();
                    suffix = " (modified)";
                    tree
                }
                Err(strata_git::Error::MergeConflicts { .. }) => {
                    // Conflicts stay in the worktree; the committed tree
                    // is ours.
                    merge_conflict = true;
                    suffix = " (conflict)";
                    ours.clone()
                }
                Err(err) => return Err(self.halt(err.to_string())),
            }
        };
        cd = cd.set_tree(tree);

        let changed = cd.parents != orig_cd.parents
            || cd.tree != orig_cd.tree
            || cd.author != orig_cd.author
            || cd.message != orig_cd.message;
        let new_commit = if changed {
            Some(cd.write(repo).map_err(Error::Git)?)
        } else {
            suffix = " (unmodified)";
            None
        };
        if !merge_conflict && cd.is_nochange(repo).map_err(Error::Git)? {
            suffix = " (empty)";
        }
        info!("Pushed {name}{suffix}");

        if merge_conflict {
            // We just caused conflicts, so the terminal checkout must
            // tolerate them; the list update replays after the first
            // writeback pass.
            self.allow_conflicts = true;
            self.conflicting_push = Some(PendingPush {
                patch: name.clone(),
                commit: new_commit,
            });
            Err(self.halt("Merge conflict"))
        } else {
            self.finish_push(name, new_commit);
            Ok(())
        }
    }

    /// The deferred half of a push: stage the new commit (if any) and
    /// move the name to the top of applied.
    fn finish_push(&mut self, name: &PatchName, commit: Option<Commit>) {
        if let Some(commit) = commit {
            self.patches.insert(name.clone(), Some(commit));
        }
        if let Some(i) = self.hidden.iter().position(|pn| pn == name) {
            self.hidden.remove(i);
        } else if let Some(i) = self.unapplied.iter().position(|pn| pn == name) {
            self.unapplied.remove(i);
        }
        self.applied.push(name.clone());
    }

    /// Pop and push as needed to reach the given orderings. Shared
    /// applied prefixes are left alone, so unchanged patches keep their
    /// commits.
    ///
    /// # Errors
    /// [`Error::Halted`] when a push halts; [`Error::Internal`] when the
    /// target lists do not cover exactly the stack's patches.
    pub fn reorder_patches(
        &mut self,
        applied: &[PatchName],
        unapplied: &[PatchName],
        hidden: &[PatchName],
        mut iw: Option<&mut IndexAndWorktree>,
    ) -> Result<(), Error> {
        let common = self
            .applied
            .iter()
            .zip(applied)
            .take_while(|(a, b)| a == b)
            .count();
        let to_pop: BTreeSet<PatchName> = self.applied[common..].iter().cloned().collect();
        self.pop_patches(|pn| to_pop.contains(pn));
        for name in &applied[common..] {
            self.push_patch(name, iw.as_deref_mut())?;
        }

        if self.applied != applied {
            return Err(Error::Internal {
                message: "reorder did not produce the requested applied list".to_owned(),
            });
        }
        let mut got: Vec<&PatchName> = self.unapplied.iter().chain(&self.hidden).collect();
        let mut want: Vec<&PatchName> = unapplied.iter().chain(hidden).collect();
        got.sort();
        want.sort();
        if got != want {
            return Err(Error::Internal {
                message: "reorder target lists do not cover the stack's patches".to_owned(),
            });
        }
        self.unapplied = unapplied.to_vec();
        self.hidden = hidden.to_vec();
        Ok(())
    }

    /// Restore the worktree to the stack's recorded head. The only state
    /// an un-run transaction can have touched is the index and worktree,
    /// so there is nothing else to undo.
    ///
    /// # Errors
    /// Propagates checkout failures.
    pub fn abort(&mut self, iw: Option<&mut IndexAndWorktree>) -> Result<(), Error> {
        if let Some(iw) = iw {
            let head_tree = self
                .stack
                .branch_head()?
                .tree(self.stack.repo())
                .map_err(Error::Git)?;
            self.checkout(&head_tree, Some(iw), true)?;
        }
        Ok(())
    }

    fn checkout(
        &mut self,
        tree: &Tree,
        iw: Option<&mut IndexAndWorktree>,
        allow_bad_head: bool,
    ) -> Result<(), Error> {
        if !allow_bad_head && !self.stack.head_top_equal()? {
            return Err(Error::Transaction {
                message: HEAD_TOP_MISMATCH.to_owned(),
            });
        }
        if self.current_tree == *tree && !self.discard_changes {
            // No tree change — but unresolved conflicts belong to the
            // topmost patch, and carrying them to another patch would be
            // wrong.
            if self.allow_conflicts {
                return Ok(());
            }
            let Some(iw) = iw else {
                return Ok(());
            };
            if iw.index().conflicts().map_err(Error::Git)?.is_empty() {
                return Ok(());
            }
            return Err(Error::Transaction {
                message: "need to resolve conflicts first (all changes rolled back)".to_owned(),
            });
        }
        let Some(iw) = iw else {
            return Err(Error::Internal {
                message: "tree change without an index and worktree".to_owned(),
            });
        };
        if self.discard_changes {
            iw.checkout_hard(tree).map_err(Error::Git)?;
        } else {
            iw.checkout(&self.current_tree, tree).map_err(Error::Git)?;
        }
        self.current_tree = tree.clone();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Terminal phase
    // -----------------------------------------------------------------------

    /// Execute the transaction with default [`RunOptions`].
    ///
    /// # Errors
    /// As [`StackTransaction::run_with`].
    pub fn run(self, iw: Option<&mut IndexAndWorktree>) -> Result<TransactionOutcome, Error> {
        self.run_with(iw, RunOptions::default())
    }

    /// Execute the transaction: either every step below succeeds, or an
    /// error is returned with the repository unchanged.
    ///
    /// In order: consistency check, external-modification audit, worktree
    /// checkout of the new head (aborting cleanly if the worktree is
    /// dirty), branch ref advance, patch metadata writeback, audit log
    /// entry, deferred conflicting-push replay under `msg (CONFLICT)`,
    /// and the "Now at patch" report.
    ///
    /// # Errors
    /// [`Error::Transaction`] on a refused checkout (after rollback);
    /// anything else propagates from the git layer.
    pub fn run_with(
        mut self,
        mut iw: Option<&mut IndexAndWorktree>,
        options: RunOptions,
    ) -> Result<TransactionOutcome, Error> {
        self.check_consistency()?;
        log::log_external_mods(self.stack)?;
        // A deferred conflicting push has not reached the applied list
        // yet, but its commit is still the head everything below must
        // install.
        let new_head = match (&self.bad_head, &self.conflicting_push) {
            (Some(head), _) => head.clone(),
            (None, Some(PendingPush {
                commit: Some(commit),
                ..
            })) => commit.clone(),
            _ => self.top()?,
        };

        if options.set_head {
            let checked_out = match iw.as_deref_mut() {
                Some(iw_ref) => {
                    let new_tree = new_head.tree(self.stack.repo()).map_err(Error::Git)?;
                    self.checkout(&new_tree, Some(iw_ref), options.allow_bad_head)
                }
                None => Ok(()),
            };
            match checked_out {
                Ok(()) => {}
                Err(Error::Git(strata_git::Error::CheckoutDirty)) => {
                    self.abort(iw.as_deref_mut())?;
                    return Err(Error::Transaction {
                        message: "command aborted (all changes rolled back)".to_owned(),
                    });
                }
                Err(other) => return Err(other),
            }
            self.stack.set_head(&new_head, &self.msg)?;
        }

        if let Some(message) = &self.error {
            error!("{message}");
        }

        let old_applied = self.stack.applied().to_vec();
        let msg = self.msg.clone();
        self.write_state(&msg)?;
        if let Some(pending) = self.conflicting_push.take() {
            self.patches.clear();
            self.finish_push(&pending.patch, pending.commit);
            self.write_state(&format!("{msg} (CONFLICT)"))?;
        }
        if options.print_current {
            Self::print_current_patch(&old_applied, &self.applied);
        }

        Ok(if self.error.is_some() {
            TransactionOutcome::Conflict
        } else {
            TransactionOutcome::Clean
        })
    }

    /// Every override entry must either target an existing patch or
    /// introduce a fresh name that the staged lists place somewhere.
    fn check_consistency(&self) -> Result<(), Error> {
        let staged: BTreeSet<&PatchName> = self
            .applied
            .iter()
            .chain(&self.unapplied)
            .chain(&self.hidden)
            .collect();
        for (name, entry) in &self.patches {
            match entry {
                None => {
                    if !self.stack.has_patch(name) {
                        return Err(Error::Internal {
                            message: format!("cannot delete unknown patch `{name}`"),
                        });
                    }
                }
                Some(_) => {
                    if !staged.contains(name) {
                        return Err(Error::Internal {
                            message: format!("patch `{name}` is staged but in no list"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// One writeback pass: patch refs and map, then orderings, then a log
    /// entry.
    fn write_state(&mut self, msg: &str) -> Result<(), Error> {
        for (name, entry) in &self.patches {
            match entry {
                None => self.stack.delete_patch(name)?,
                Some(commit) => self.stack.write_patch(name, commit.clone(), msg)?,
            }
        }
        self.stack.set_order(
            self.applied.clone(),
            self.unapplied.clone(),
            self.hidden.clone(),
        );
        log::log_entry(self.stack, msg)
    }

    fn print_popped(popped: &[PatchName]) {
        match popped {
            [] => {}
            [only] => info!("Popped {only}"),
            [bottom, .., top] => info!("Popped {top} -- {bottom}"),
        }
    }

    fn print_current_patch(old_applied: &[PatchName], new_applied: &[PatchName]) {
        match (old_applied.last(), new_applied.last()) {
            (_, None) if old_applied.is_empty() => {}
            (_, None) => info!("No patch applied"),
            (Some(old), Some(new)) if old == new => {}
            (_, Some(new)) => info!("Now at patch \"{new}\""),
        }
    }
}
