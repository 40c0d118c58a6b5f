//! Crate-level errors and exit-code mapping.

use thiserror::Error;

/// Process exit code for a fully successful operation.
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code for a general error.
pub const EXIT_GENERAL_ERROR: i32 = 1;
/// Process exit code for a failed git subprocess.
pub const EXIT_COMMAND_ERROR: i32 = 2;
/// Process exit code for a merge conflict (the operation still recorded a
/// conflicted state).
pub const EXIT_CONFLICT: i32 = 3;
/// Process exit code for a broken internal invariant.
pub const EXIT_BUG: i32 = 4;

/// Errors returned by the stack core.
#[derive(Debug, Error)]
pub enum Error {
    /// A failure in the git layer.
    #[error(transparent)]
    Git(#[from] strata_git::Error),

    /// Stack state on disk could not be read back.
    #[error("corrupt stack state for branch `{branch}`: {message}")]
    CorruptState {
        /// The branch whose stack is damaged.
        branch: String,
        /// What was wrong.
        message: String,
    },

    /// A stack already exists where one was being created, or none exists
    /// where one was expected.
    #[error("{message}")]
    Stack {
        /// Human-readable description.
        message: String,
    },

    /// A transaction refused to proceed and rolled back cleanly.
    #[error("{message}")]
    Transaction {
        /// Why the transaction aborted.
        message: String,
    },

    /// A transaction operation stopped part-way; the terminal phase can
    /// still record the partial (conflicted) state.
    ///
    /// This is control flow, not a hard failure: callers collect it, stop
    /// staging further operations, and proceed to `run()`.
    #[error("{message}")]
    Halted {
        /// The halt reason, also kept in the transaction itself.
        message: String,
    },

    /// An internal invariant did not hold.
    #[error("internal error: {message}")]
    Internal {
        /// The violated invariant.
        message: String,
    },
}

impl Error {
    /// Whether this is the [`Error::Halted`] control signal.
    #[must_use]
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }

    /// The exit-code contract for wrapping callers: 1 general, 2 failed
    /// git command, 3 conflict, 4 internal invariant violation.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Git(err) => match err {
                strata_git::Error::Run { .. } => EXIT_COMMAND_ERROR,
                strata_git::Error::MergeConflicts { .. } => EXIT_CONFLICT,
                _ => EXIT_GENERAL_ERROR,
            },
            Self::Internal { .. } => EXIT_BUG,
            Self::CorruptState { .. }
            | Self::Stack { .. }
            | Self::Transaction { .. }
            | Self::Halted { .. } => EXIT_GENERAL_ERROR,
        }
    }
}
