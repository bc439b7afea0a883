//! Common result and error types for the rheo toolkit.

#![warn(missing_docs)]

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an unrecoverable internal error (a bug in rheo), not a
/// user-facing error. User-facing failures (bad input files, unavailable
/// solvers, unsatisfiable timing) are reported through the per-crate error
/// enums instead.
pub type RheoResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in rheo, not a user input problem.
///
/// These errors should never occur during normal operation. If one does occur,
/// it means there is a logic error in the toolkit that should be fixed.
#[derive(Debug, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
