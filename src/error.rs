//! Error types for the round-trip engine.
//!
//! [`RteError`] is the unified error for every operation above the git layer.
//! Each message says what failed and what to do next, so a CI log or an agent
//! reading it can act without extra context.

use std::fmt;
use std::path::PathBuf;

use roundtrip_git::GitError;

// ---------------------------------------------------------------------------
// RteError
// ---------------------------------------------------------------------------

/// Unified error type for round-trip operations.
#[derive(Debug)]
pub enum RteError {
    /// A git object/ref/index operation failed.
    Git {
        /// The operation (e.g. `"write_blob"`, `"read_tree"`).
        op: &'static str,
        /// The hash, ref, or path the operation was acting on.
        target: String,
        /// The underlying git error.
        source: GitError,
    },

    /// A filesystem read or write failed.
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The shadow ref kept moving under us and the retry budget ran out.
    CasExhausted {
        /// The contested ref.
        ref_name: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// The batch was cancelled before the snapshot was committed.
    Cancelled,

    /// The configuration file could not be loaded or parsed.
    Config(crate::config::ConfigError),

    /// The lockfile could not be read, parsed, or written.
    Lockfile {
        /// Path to the lockfile.
        path: PathBuf,
        /// What went wrong.
        detail: String,
    },

    /// A generated path is absolute, empty, or escapes the output root.
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// A generation id cannot be embedded in a ref name.
    InvalidGenerationId {
        /// The offending id.
        id: String,
    },

    /// The path is not tracked in the lockfile.
    NotTracked {
        /// The requested path.
        path: String,
    },

    /// The path is tracked but has no pristine blob recorded.
    NoPristine {
        /// The requested path.
        path: String,
    },

    /// The custom-code patch could not be parsed.
    Patch {
        /// What went wrong.
        detail: String,
    },

    /// One or more files failed fatally during a batch; the snapshot was not
    /// advanced.
    BatchFailed {
        /// `(path, error message)` for every failed file.
        failures: Vec<(String, String)>,
    },
}

impl RteError {
    /// Convenience constructor for I/O failures.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// `true` if a CAS retry could succeed.
    #[must_use]
    pub const fn is_ref_conflict(&self) -> bool {
        matches!(
            self,
            Self::Git {
                source: GitError::RefConflict { .. },
                ..
            }
        )
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for RteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Git { op, target, source } => {
                write!(f, "git {op} failed for {target}: {source}")
            }
            Self::Io { path, source } => {
                write!(
                    f,
                    "I/O error on '{}': {source}\n  To fix: check file permissions and disk space.",
                    path.display()
                )
            }
            Self::CasExhausted { ref_name, attempts } => {
                write!(
                    f,
                    "gave up updating '{ref_name}' after {attempts} attempts: another process keeps advancing it.\n  To fix: wait for the concurrent generation to finish, then rerun."
                )
            }
            Self::Cancelled => write!(f, "batch cancelled before the pristine snapshot was written"),
            Self::Config(err) => {
                write!(
                    f,
                    "configuration error: {err}\n  To fix: edit the config file and correct the issue."
                )
            }
            Self::Lockfile { path, detail } => {
                write!(
                    f,
                    "lockfile error in '{}': {detail}\n  To fix: restore the lockfile from version control.",
                    path.display()
                )
            }
            Self::InvalidPath { path } => {
                write!(f, "invalid generated path '{path}': must be relative and stay inside the output directory")
            }
            Self::InvalidGenerationId { id } => {
                write!(
                    f,
                    "invalid generation id '{id}': use only letters, digits, '.', '_' and '-'"
                )
            }
            Self::NotTracked { path } => {
                write!(f, "'{path}' is not tracked in the lockfile")
            }
            Self::NoPristine { path } => {
                write!(
                    f,
                    "'{path}' has no pristine version recorded.\n  To fix: regenerate once so a pristine snapshot exists."
                )
            }
            Self::Patch { detail } => write!(f, "malformed custom-code patch: {detail}"),
            Self::BatchFailed { failures } => {
                write!(f, "{} file(s) failed; pristine snapshot not advanced:", failures.len())?;
                for (path, message) in failures {
                    write!(f, "\n  - {path}: {message}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Git { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<crate::config::ConfigError> for RteError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err)
    }
}

// ---------------------------------------------------------------------------
// GitResultExt
// ---------------------------------------------------------------------------

/// Attach the operation and target to a [`GitError`].
pub trait GitResultExt<T> {
    /// Wrap the error as [`RteError::Git`].
    fn op(self, op: &'static str, target: impl fmt::Display) -> Result<T, RteError>;
}

impl<T> GitResultExt<T> for Result<T, GitError> {
    fn op(self, op: &'static str, target: impl fmt::Display) -> Result<T, RteError> {
        self.map_err(|source| RteError::Git {
            op,
            target: target.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_errors_carry_operation_and_target() {
        let err: Result<(), RteError> = Err(GitError::NotFound {
            message: "blob".into(),
        })
        .op("read_blob", "abc123");
        let msg = err.unwrap_err().to_string();
        assert!(msg.contains("read_blob"));
        assert!(msg.contains("abc123"));
    }

    #[test]
    fn ref_conflict_is_detectable_through_wrapper() {
        let err = RteError::Git {
            op: "update_ref",
            target: "refs/heads/sdk-pristine".into(),
            source: GitError::RefConflict {
                ref_name: "refs/heads/sdk-pristine".into(),
                message: "moved".into(),
            },
        };
        assert!(err.is_ref_conflict());
        assert!(!RteError::Cancelled.is_ref_conflict());
    }

    #[test]
    fn batch_failure_lists_every_path() {
        let err = RteError::BatchFailed {
            failures: vec![
                ("a.go".into(), "disk full".into()),
                ("b.go".into(), "permission denied".into()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 file(s) failed"));
        assert!(msg.contains("a.go: disk full"));
        assert!(msg.contains("b.go: permission denied"));
    }
}
