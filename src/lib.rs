//! strata — transactional patch stacks on top of plain git branches.
//!
//! A *stack* is an ordered sequence of named, mutable patches layered on a
//! git branch: patches can be pushed onto the branch history, popped off,
//! reordered, and deleted, with every structural change applied atomically
//! or rolled back cleanly.
//!
//! The heart of the crate is [`StackTransaction`]: callers stage any
//! number of stack mutations against in-memory snapshots, then commit them
//! in a single terminal [`StackTransaction::run`] that checks out the new
//! head, advances the branch ref, writes patch metadata, and appends an
//! audit snapshot — or fails having changed nothing.
//!
//! The git plumbing (objects, refs, indexes, merges) lives in the
//! [`strata_git`] crate; this crate holds the stack model and the
//! transaction engine.

mod error;
pub mod stack;
#[cfg(test)]
mod testutil;

pub use error::{
    Error, EXIT_BUG, EXIT_COMMAND_ERROR, EXIT_CONFLICT, EXIT_GENERAL_ERROR, EXIT_SUCCESS,
};
pub use stack::transaction::{RunOptions, StackTransaction, TransactionOptions, TransactionOutcome};
pub use stack::{PatchName, Stack};
