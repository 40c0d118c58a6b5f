//! Error types for git operations.
//!
//! [`Error`] is the single error type returned by this crate. It uses rich
//! enum variants so callers can match on specific failure modes (missing
//! object, merge conflict, dirty worktree) without parsing error messages.

use thiserror::Error;

/// Errors returned by strata-git operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A requested object, ref, or revision was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// HEAD is not on any branch.
    #[error("not on any branch")]
    DetachedHead,

    /// A branch operation failed (missing branch, duplicate branch).
    #[error("{message}")]
    Branch {
        /// Human-readable description.
        message: String,
    },

    /// A string could not be parsed as a date or time zone.
    #[error("\"{value}\" is not a valid {what}")]
    BadDate {
        /// The raw string that failed to parse.
        value: String,
        /// What was expected (`"date"` or `"time zone"`).
        what: &'static str,
    },

    /// An identity line could not be parsed as `Name <email> secs offset`,
    /// or identity bytes could not cross the platform's `OsStr` boundary.
    #[error("malformed identity: {value:?}")]
    BadIdentity {
        /// The raw bytes, lossily decoded.
        value: String,
    },

    /// A git subprocess exited non-zero unexpectedly.
    #[error("`{command}` failed{}{}", code_suffix(.exit_code), stderr_suffix(.stderr))]
    Run {
        /// The command that was run (e.g. `"git update-ref …"`).
        command: String,
        /// Stderr output from git, trimmed.
        stderr: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
    },

    /// A patch did not apply to the index.
    #[error("patch does not apply cleanly")]
    DoesNotApply,

    /// The index holds unresolved entries; its tree cannot be written.
    #[error("conflicting merge")]
    ConflictingMerge,

    /// A worktree merge produced conflicts.
    ///
    /// Carries the `CONFLICT …` lines from `merge-recursive` so callers can
    /// drive user messaging.
    #[error("merge produced {} conflict(s)", conflicts.len())]
    MergeConflicts {
        /// The `CONFLICT …` lines, verbatim.
        conflicts: Vec<String>,
    },

    /// `read-tree` refused to switch trees because the index or worktree
    /// has local modifications.
    #[error("index/worktree dirty")]
    CheckoutDirty,

    /// An OID string failed validation.
    #[error("invalid OID {value:?}: {reason}")]
    InvalidOid {
        /// The raw value.
        value: String,
        /// Why validation failed.
        reason: String,
    },

    /// An I/O error (spawning git, piping stdio, temp files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" (exit code {c})")).unwrap_or_default()
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl Error {
    /// True for the two clean index-merge failures (`DoesNotApply`,
    /// `ConflictingMerge`) that a three-way merge absorbs rather than
    /// propagates.
    #[must_use]
    pub fn is_merge_failure(&self) -> bool {
        matches!(self, Self::DoesNotApply | Self::ConflictingMerge)
    }
}
