//! Error types for git operations.
//!
//! [`GitError`] is the single error type returned by all [`GitRepo`](crate::GitRepo)
//! methods. Callers match on variants (missing object, CAS mismatch, remote
//! failure) instead of parsing messages.

use thiserror::Error;

/// Errors returned by [`GitRepo`](crate::GitRepo) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// A requested object, ref, or path was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// A ref update failed because the ref's current value did not match the
    /// expected old value, or the ref lock was held by another writer.
    #[error("ref conflict on `{ref_name}`: {message}")]
    RefConflict {
        /// The ref that could not be updated.
        ref_name: String,
        /// Details about the mismatch.
        message: String,
    },

    /// An OID string could not be parsed or was otherwise invalid.
    #[error("invalid OID `{value}`: {reason}")]
    InvalidOid {
        /// The raw value that failed validation.
        value: String,
        /// Why validation failed.
        reason: String,
    },

    /// A ref name was rejected before reaching the backend.
    #[error("invalid ref name `{value}`: {reason}")]
    InvalidRefName {
        /// The rejected name.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An I/O error occurred (file system, process spawn, etc.).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A fetch from or push to a remote failed.
    #[error("{operation} `{refspec}` via `{remote}` failed: {message}")]
    RemoteFailed {
        /// `"fetch"` or `"push"`.
        operation: &'static str,
        /// The remote name (e.g., `"origin"`).
        remote: String,
        /// The refspec that was transferred.
        refspec: String,
        /// Captured stderr from git.
        message: String,
    },

    /// The underlying git backend returned an unclassified error.
    ///
    /// The `message` should include enough context to diagnose the failure.
    #[error("git backend error: {message}")]
    BackendError {
        /// Freeform error description from the backend.
        message: String,
    },
}

impl GitError {
    /// `true` for optimistic-concurrency failures that a caller may retry.
    #[must_use]
    pub const fn is_ref_conflict(&self) -> bool {
        matches!(self, Self::RefConflict { .. })
    }

    /// `true` when the error means the object or ref does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<crate::types::OidParseError> for GitError {
    fn from(e: crate::types::OidParseError) -> Self {
        Self::InvalidOid {
            value: e.value,
            reason: e.reason,
        }
    }
}

impl From<crate::types::RefNameError> for GitError {
    fn from(e: crate::types::RefNameError) -> Self {
        Self::InvalidRefName {
            value: e.value,
            reason: e.reason,
        }
    }
}
