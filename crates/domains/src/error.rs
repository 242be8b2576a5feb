//! # DomainError
//!
//! Centralized error handling for the sundew engine.
//! Every failure a caller can observe maps onto one of these variants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The primary error type for all engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed name or address; rejected before any mutation
    #[error("validation error: {0}")]
    Validation(String),

    /// Uniqueness violation on a node name/address or a namespace slug
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A remote collaborator could not be reached after the retry budget
    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// State that should be structurally impossible; needs an operator
    #[error("consistency error: {0}")]
    Consistency(String),

    /// The backing store failed (e.g. SQLite locked, file unreadable)
    #[error("storage error: {0}")]
    Storage(String),
}

/// Stable, serializable tag for a `DomainError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Duplicate,
    Connectivity,
    NotFound,
    Consistency,
    Storage,
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::Duplicate(_) => ErrorKind::Duplicate,
            DomainError::Connectivity(_) => ErrorKind::Connectivity,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Consistency(_) => ErrorKind::Consistency,
            DomainError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// The explanation without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            DomainError::Validation(m)
            | DomainError::Duplicate(m)
            | DomainError::Connectivity(m)
            | DomainError::NotFound(m)
            | DomainError::Consistency(m)
            | DomainError::Storage(m) => m,
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        DomainError::Storage(err.to_string())
    }
}

/// Failure of a single call to a remote collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// No usable response (connect failure, timeout, 5xx). Worth retrying.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The collaborator answered and refused.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The collaborator answered with something we could not parse.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_))
    }
}

impl From<RemoteError> for DomainError {
    fn from(err: RemoteError) -> Self {
        DomainError::Connectivity(err.to_string())
    }
}

/// A specialized Result type for engine logic.
pub type Result<T> = std::result::Result<T, DomainError>;
