//! The stack log writer.
//!
//! Each entry is a commit on `refs/strata/<branch>/stack` whose tree holds
//! one `stack.json` blob (see [`crate::stack::state`]); the parent chain
//! is the audit history. Two operations matter to the transaction engine:
//! [`log_entry`] appends a snapshot after each writeback pass, and
//! [`log_external_mods`] records a marker when the branch was moved behind
//! the stack's back, so the divergence is visible in the log before the
//! next mutation.

use strata_git::{CommitData, FileMode, ObjectKind, Repository, TreeData, TreeEntry};
use tracing::debug;

use crate::error::Error;
use crate::stack::state::{StackState, STATE_FILE};
use crate::stack::{stack_ref, Stack};

/// Append a snapshot of the stack's current state under the given
/// message.
///
/// # Errors
/// Propagates object construction and ref update failures.
pub fn log_entry(stack: &Stack<'_>, msg: &str) -> Result<(), Error> {
    let state = StackState::capture(stack)?;
    write_snapshot(stack, &state, msg)
}

/// Record a marker entry if the branch head no longer matches the last
/// snapshot (someone used plain git underneath us). A no-op when the log
/// is current.
///
/// # Errors
/// Propagates snapshot read/write failures.
pub fn log_external_mods(stack: &Stack<'_>) -> Result<(), Error> {
    let branch_name = stack.branch().name();
    let Some(last) = read_snapshot(stack.repo(), branch_name)? else {
        return Ok(());
    };
    let head = stack.branch_head()?;
    if &last.head == head.oid() {
        return Ok(());
    }
    debug!(
        branch = branch_name,
        logged = %last.head,
        actual = %head.oid(),
        "branch head moved externally"
    );
    // Record the head git actually has, so the marker itself brings the
    // log current and is not re-appended on every start.
    let mut state = StackState::capture(stack)?;
    state.head = head.oid().clone();
    write_snapshot(stack, &state, "external modifications")
}

/// Read the most recent snapshot, or `None` when the branch has no stack.
///
/// # Errors
/// [`Error::CorruptState`] when the snapshot commit lacks a readable
/// `stack.json`.
pub(crate) fn read_snapshot(
    repo: &Repository,
    branch_name: &str,
) -> Result<Option<StackState>, Error> {
    let Some(oid) = repo.refs().lookup(&stack_ref(branch_name))? else {
        return Ok(None);
    };
    let commit = repo.get_commit(&oid);
    let tree = commit.tree(repo).map_err(Error::Git)?;
    let tree_data = tree.data(repo).map_err(Error::Git)?;
    let entry = tree_data
        .entry(STATE_FILE.as_bytes())
        .ok_or_else(|| Error::CorruptState {
            branch: branch_name.to_owned(),
            message: format!("snapshot commit {oid} has no {STATE_FILE}"),
        })?;
    let blob = repo.get_blob(&entry.oid);
    let bytes = blob.bytes(repo).map_err(Error::Git)?;
    Ok(Some(StackState::from_json(branch_name, &bytes)?))
}

fn write_snapshot(stack: &Stack<'_>, state: &StackState, msg: &str) -> Result<(), Error> {
    let repo = stack.repo();
    let branch_name = stack.branch().name();
    let ref_name = stack_ref(branch_name);

    let blob = repo.write_blob(state.to_json()?)?;
    let tree = TreeData::new(vec![TreeEntry {
        mode: FileMode::Regular,
        kind: ObjectKind::Blob,
        oid: blob.oid().clone(),
        name: STATE_FILE.into(),
    }])
    .write(repo)?;

    let parents = match repo.refs().lookup(&ref_name)? {
        Some(prev) => vec![repo.get_commit(&prev)],
        None => Vec::new(),
    };
    let commit = CommitData::new(tree, parents, format!("{msg}\n")).write(repo)?;
    repo.refs().set(&ref_name, commit.oid(), msg)?;
    debug!(branch = branch_name, msg, "stack snapshot appended");
    Ok(())
}
