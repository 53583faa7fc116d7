//! Round-trip engineering for generated code.
//!
//! Regenerating an SDK overwrites files that users may have edited by hand.
//! This crate keeps those edits alive:
//!
//! - **identity / scanner / pregeneration**: find tracked files by the
//!   `@generated-id:` header and reconcile moves, deletions, and edits
//!   before a run.
//! - **merge**: three-way merge of pristine, on-disk, and newly generated
//!   content, with conflicts staged in the git index.
//! - **shadow**: the pristine history, kept as commits on a hidden branch.
//! - **diff / patch / pristine**: inspect, capture, and undo user edits.
//!
//! All state lives in `<out_dir>/.rte/` ([`state_dir`]); the git layer is
//! the `roundtrip-git` crate.

use std::path::{Path, PathBuf};

pub mod config;
pub mod diff;
pub mod error;
pub mod identity;
pub mod lockfile;
pub mod merge;
pub mod patch;
pub mod pregeneration;
pub mod pristine;
pub mod scanner;
pub mod shadow;
pub mod telemetry;

pub use config::RteConfig;
pub use error::RteError;
pub use identity::Identity;
pub use lockfile::{GenConfigAccessor, Lockfile, TrackedFile};
pub use merge::{BatchOptions, BatchReport, Engine, MergeStatus, VirtualFile};
pub use shadow::{ShadowManager, Snapshot};

/// Directory holding the lockfile, config, and captured patches.
#[must_use]
pub fn state_dir(out_dir: &Path) -> PathBuf {
    out_dir.join(".rte")
}

/// Reject empty, absolute, and escaping paths.
pub(crate) fn validate_relative_path(path: &str) -> Result<(), RteError> {
    let bad = path.is_empty()
        || path.contains('\\')
        || path
            .split('/')
            .any(|c| c.is_empty() || c == "." || c == ".." || c == ".git");
    if bad {
        Err(RteError::InvalidPath {
            path: path.to_owned(),
        })
    } else {
        Ok(())
    }
}
