//! Error types and failure classification for odm-pilot
//!
//! Every failure raised by the submit/monitor/retrieve pipeline is classified
//! into exactly one [`FailureKind`] so that callers (the CLI in particular)
//! can decide exit behavior without inspecting error internals.

use thiserror::Error;

use crate::types::TaskId;

/// Result type alias for odm-pilot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for odm-pilot
///
/// Variants carry enough context for a one-line user-facing message; the
/// mapping onto the failure taxonomy lives in [`Error::kind`].
#[derive(Debug, Error)]
pub enum Error {
    /// The processing node could not be reached (refused, unroutable, or
    /// timed out) at any stage of the pipeline
    #[error("cannot connect: {0}")]
    Connection(String),

    /// The node answered but rejected the request (bad options, auth
    /// failure, unknown task, malformed response)
    #[error("{0}")]
    Protocol(String),

    /// The remote job itself reported a failed status
    #[error("task {id} failed: {message}")]
    TaskFailed {
        /// Identifier of the failed task
        id: TaskId,
        /// Error message reported by the node, if any
        message: String,
        /// Last few lines of the task's processing log, for diagnostics
        log_tail: Vec<String>,
    },

    /// The run was canceled by an external interrupt while monitoring
    #[error("task canceled")]
    Canceled,

    /// The local destination could not be written to during retrieval
    #[error("cannot write results: {0}")]
    Storage(String),

    /// No input files were supplied to submit
    #[error("no input files")]
    NoInputFiles,

    /// An operation was attempted in a state that does not allow it
    /// (e.g. retrieving results for a task that has not completed)
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Local I/O error reading input files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error building a request payload
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The five failure domains of the pipeline
///
/// Exit-status contract: success is 0, any classified failure is non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Network unreachable or timed out at any stage
    Connection,
    /// Node rejected a well-formed request
    Protocol,
    /// Remote job reported failed status
    TaskFailed,
    /// User-initiated abort, not a system error
    Canceled,
    /// Local destination unwritable during retrieval
    Storage,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Connection => "connection",
            FailureKind::Protocol => "protocol",
            FailureKind::TaskFailed => "task-failed",
            FailureKind::Canceled => "canceled",
            FailureKind::Storage => "storage",
        };
        write!(f, "{}", name)
    }
}

impl Error {
    /// Classify this error into one of the five failure domains
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Connection(_) => FailureKind::Connection,
            Error::Protocol(_)
            | Error::NoInputFiles
            | Error::InvalidState(_)
            | Error::Serialization(_) => FailureKind::Protocol,
            Error::TaskFailed { .. } => FailureKind::TaskFailed,
            Error::Canceled => FailureKind::Canceled,
            Error::Storage(_) | Error::Io(_) => FailureKind::Storage,
        }
    }

    /// Process exit code for this error (any classified failure is 1)
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// Map a reqwest transport error onto the taxonomy.
    ///
    /// Timeouts and connection failures are `Connection`; anything else the
    /// transport reports (decode errors, redirect loops) means the node
    /// answered in a way we could not use, which is `Protocol`.
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::Connection(e.to_string())
        } else {
            Error::Protocol(e.to_string())
        }
    }
}
