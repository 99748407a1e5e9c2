// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for remote store and coordination operations.

use std::fmt;

use recoverable::{Recovery, RecoveryInfo};

/// Classifies what went wrong in a store-backed operation.
///
/// Absence is not an error: reads that find nothing return `Ok(None)`. The kinds
/// below cover the situations a caller has to react to differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The value is absent where the operation required it to exist.
    NotFound,
    /// A lock is held by someone else. Expected under contention.
    LockUnavailable,
    /// The caller-supplied loader failed while reading the source of truth.
    LoaderFailure,
    /// The remote store could not be reached or rejected the command.
    RemoteStoreUnavailable,
    /// Stored data could not be decoded.
    Corrupted,
    /// Background work could not be scheduled because the pool is saturated.
    Rejected,
}

impl ErrorKind {
    /// Returns a short, stable name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::LockUnavailable => "lock unavailable",
            Self::LoaderFailure => "loader failure",
            Self::RemoteStoreUnavailable => "remote store unavailable",
            Self::Corrupted => "corrupted data",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a store-backed operation.
///
/// Use [`Error::kind`] to branch on the failure and [`std::error::Error::source()`]
/// to reach the underlying cause.
///
/// # Example
///
/// ```
/// use rampart_store::{Error, ErrorKind};
///
/// let error = Error::unavailable("connection refused");
/// assert_eq!(error.kind(), ErrorKind::RemoteStoreUnavailable);
/// ```
#[ohno::error]
#[display("{kind}")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Creates a [`ErrorKind::RemoteStoreUnavailable`] error from a transport or server failure.
    pub fn unavailable(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::RemoteStoreUnavailable, cause)
    }

    /// Creates a [`ErrorKind::Corrupted`] error for data that could not be decoded.
    pub fn corrupted(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Corrupted, cause)
    }

    /// Creates a [`ErrorKind::LoaderFailure`] error wrapping the loader's own error.
    pub fn loader(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::LoaderFailure, cause)
    }

    /// Creates a [`ErrorKind::LockUnavailable`] error for a lock that stayed held by someone else.
    #[must_use]
    pub fn lock_unavailable() -> Self {
        Self::new(ErrorKind::LockUnavailable)
    }

    /// Returns `true` if the remote store is down and the whole layer should be treated as unavailable.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.kind == ErrorKind::RemoteStoreUnavailable
    }
}

impl Recovery for Error {
    fn recovery(&self) -> RecoveryInfo {
        match self.kind {
            ErrorKind::RemoteStoreUnavailable => RecoveryInfo::unavailable(),
            ErrorKind::LockUnavailable | ErrorKind::Rejected => RecoveryInfo::retry(),
            ErrorKind::NotFound | ErrorKind::LoaderFailure | ErrorKind::Corrupted => RecoveryInfo::never(),
        }
    }
}

/// A specialized [`Result`] type for store-backed operations.
pub type Result<T> = std::result::Result<T, Error>;
