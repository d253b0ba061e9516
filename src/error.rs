//! Error types and handling for the storage fabric.
//!
//! This module defines the single error taxonomy used throughout the
//! crate, covering both the metadata plane (Deva) and the chunk plane
//! (Manusya). Variants map directly onto the taxonomy a transport layer
//! needs to classify a reply's status.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the storage fabric.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing chunk, inode, or dentry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate `(parent, name)` or re-create of an existing id.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Malformed ObjectId, append at wrong offset, or other bad input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Append on sealed chunk, remove of non-empty directory, mutation on
    /// a non-leader replica.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// No leader, or a dependent channel failed to initialize.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Serialization failure, snapshot I/O failure. Fatal if observed
    /// during log apply.
    #[error("internal error: {0}")]
    Internal(String),

    /// Surfaced by a transport layer; never cancels a committed state
    /// transition.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// I/O errors from the durable store backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable store backend errors (sled).
    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    /// Op payload encode/decode failures.
    #[error("codec error: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),
}

impl Error {
    /// Build a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Build an `AlreadyExists` error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Build an `InvalidArgument` error.
    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    /// Build a `FailedPrecondition` error.
    pub fn failed_precondition(what: impl Into<String>) -> Self {
        Self::FailedPrecondition(what.into())
    }

    /// Build an `Unavailable` error.
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Unavailable(what.into())
    }

    /// Build an `Internal` error.
    pub fn internal(what: impl Into<String>) -> Self {
        Self::Internal(what.into())
    }

    /// Whether a caller could reasonably retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Unavailable(_) | Error::DeadlineExceeded(_))
    }

    /// Whether this is a client-caused (4xx-equivalent) error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_)
                | Error::NotFound(_)
                | Error::AlreadyExists(_)
                | Error::FailedPrecondition(_)
        )
    }

    /// Whether this is a server-caused (5xx-equivalent) error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Internal(_) | Error::Unavailable(_) | Error::Io(_) | Error::Store(_))
    }

    /// Whether the condition that produced this error requires halting the
    /// replica rather than surfacing a reply (a corrupted replicated log).
    pub fn is_fatal_apply_error(&self) -> bool {
        matches!(self, Error::Internal(_) | Error::Codec(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_vs_server_errors_are_disjoint() {
        let errors: Vec<Error> = vec![
            Error::not_found("x"),
            Error::already_exists("x"),
            Error::invalid_argument("x"),
            Error::failed_precondition("x"),
            Error::unavailable("x"),
            Error::internal("x"),
            Error::DeadlineExceeded("x".into()),
        ];
        for e in errors {
            assert!(!(e.is_client_error() && e.is_server_error()), "{e:?}");
        }
    }

    #[test]
    fn unavailable_is_retryable() {
        assert!(Error::unavailable("no leader").is_retryable());
        assert!(!Error::not_found("x").is_retryable());
    }
}
