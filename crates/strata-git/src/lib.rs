//! Git abstraction layer for strata — a subprocess façade over the git CLI.
//!
//! Everything that talks to the `git` binary lives here:
//!
//! - [`Repository`] — the façade owning the object intern caches, the
//!   cached [`RefStore`], and the two pooled helper subprocesses
//!   (`cat-file --batch` for object reads, `diff-tree --stdin` for diffs).
//! - [`Blob`]/[`Tree`]/[`Commit`] — interned, lazily-loaded object
//!   handles; [`CommitData`]/[`TreeData`] are their buildable payloads.
//! - [`Index`], [`Worktree`], [`IndexAndWorktree`] — staging-area
//!   wrappers and the three-way merge engine.
//! - [`Branch`], [`Date`], [`Signature`] — the small supporting cast.
//!
//! The crate assumes git ≥ 2.x on `PATH` and consumes its on-disk formats
//! verbatim through subprocess output; it never parses the object store
//! itself.

mod branch;
mod catfile;
mod date;
mod difftree;
mod error;
mod index;
mod object;
mod oid;
mod refs;
mod repo;
mod run;
mod signature;
#[cfg(test)]
mod testutil;

pub use branch::Branch;
pub use date::Date;
pub use error::Error;
pub use index::{Index, IndexAndWorktree, Worktree};
pub use object::{Blob, Commit, CommitData, FileMode, ObjectKind, Tree, TreeData, TreeEntry};
pub use oid::{Oid, ZERO_OID};
pub use refs::RefStore;
pub use repo::{FileDiff, Repository};
pub use signature::Signature;
