//! Error types for graph construction and evaluation.
//!
//! Construction-time validation failures surface as [`Error::InvalidInput`]
//! and are the caller's responsibility to fix. Failures raised by
//! user-supplied operators or source adapters travel through
//! [`Error::Operator`] unchanged; when one escapes a batch, the session that
//! ran it is poisoned and refuses further work.

use thiserror::Error;

/// Everything that can go wrong while building or evaluating a graph.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller handed the engine something malformed: non-increasing
    /// timestamps, mismatched lengths, a zero-width window, a negative lag.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A safe accessor was asked for a value that is not there, e.g. the
    /// output of a node the session was never asked to collect.
    #[error("missing value: {0}")]
    MissingValue(String),

    /// Internal bookkeeping broke an invariant. Always a bug in the engine or
    /// in an operator implementation, never user-recoverable.
    #[error("evaluation state corrupted: {0}")]
    StateCorruption(String),

    /// A user operator or source adapter failed. The error is propagated
    /// unchanged; the batch it interrupted is abandoned.
    #[error(transparent)]
    Operator(#[from] anyhow::Error),
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::StateCorruption(msg.into())
    }
}
