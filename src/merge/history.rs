//! Where merge bases come from.

use std::sync::Arc;

use roundtrip_git::{GitError, GitRepo};

use crate::diff::parse_blob_hash;
use crate::error::{GitResultExt as _, RteError};

/// Retrieves pristine content by blob hash.
pub trait HistoryProvider: Send + Sync {
    /// Pristine bytes for `hash`.
    ///
    /// # Errors
    /// [`RteError::Git`] wrapping [`GitError::NotFound`] when the object is
    /// missing; other errors for a malformed hash or a read failure.
    fn pristine(&self, hash: &str) -> Result<Vec<u8>, RteError>;
}

/// Reads pristine blobs from the object database.
#[derive(Clone)]
pub struct GitHistoryProvider {
    repo: Arc<dyn GitRepo>,
}

impl GitHistoryProvider {
    /// A provider over `repo`.
    #[must_use]
    pub fn new(repo: Arc<dyn GitRepo>) -> Self {
        Self { repo }
    }
}

impl HistoryProvider for GitHistoryProvider {
    fn pristine(&self, hash: &str) -> Result<Vec<u8>, RteError> {
        let oid = parse_blob_hash(hash).ok_or_else(|| RteError::Git {
            op: "read_blob",
            target: hash.to_owned(),
            source: GitError::InvalidOid {
                value: hash.to_owned(),
                reason: "expected a 40-character hex blob hash".to_owned(),
            },
        })?;
        if !self.repo.has_object(oid) {
            return Err(RteError::Git {
                op: "read_blob",
                target: hash.to_owned(),
                source: GitError::NotFound {
                    message: format!("blob {oid} is not in the object database"),
                },
            });
        }
        self.repo.read_blob(oid).op("read_blob", oid)
    }
}

/// `true` if `err` means the pristine object simply isn't there.
#[must_use]
pub fn is_missing(err: &RteError) -> bool {
    matches!(err, RteError::Git { source, .. } if source.is_not_found())
}
