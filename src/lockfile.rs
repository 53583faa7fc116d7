//! Per-path tracking state persisted between generation runs
//! (`.rte/lock.json`).

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RteError;
use crate::identity::Identity;

/// Current lockfile schema version.
pub const LOCKFILE_VERSION: u32 = 1;

/// Hex SHA-256 of `content`, the form stored in `last_write_checksum`.
#[must_use]
pub fn checksum(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

// ---------------------------------------------------------------------------
// TrackedFile
// ---------------------------------------------------------------------------

/// What the engine remembers about one generated path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    /// Identity token embedded in the file header, if the file has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Identity>,

    /// Blob hash of the last pristine generated content (merge base).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pristine_blob_hash: Option<String>,

    /// SHA-256 of the bytes last written to disk by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_write_checksum: Option<String>,

    /// The user deleted this file; regeneration must not recreate it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,

    /// The user moved this file; merges target this path instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_to: Option<String>,
}

impl TrackedFile {
    /// The on-disk path merges should read and write for logical `path`.
    #[must_use]
    pub fn disk_path<'a>(&'a self, path: &'a str) -> &'a str {
        self.moved_to.as_deref().unwrap_or(path)
    }
}

/// Fields refreshed after a successful batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedUpdate {
    /// New pristine blob hash.
    pub pristine_blob_hash: String,
    /// Checksum of what was written to disk, or `None` if nothing was written.
    pub last_write_checksum: Option<String>,
    /// Identity found in the generated content.
    pub id: Option<Identity>,
}

// ---------------------------------------------------------------------------
// GenConfigAccessor
// ---------------------------------------------------------------------------

/// Narrow read/write view of tracking state used by the merge engine.
pub trait GenConfigAccessor: Send {
    /// The tracking record for `path`, if any.
    fn tracked_file(&self, path: &str) -> Option<TrackedFile>;

    /// Create or refresh the record for `path`. Deleted/moved markers are
    /// preserved; an existing identity is never replaced.
    fn update_tracked_file(&mut self, path: &str, update: TrackedUpdate);

    /// Drop records whose path is not in `keep`. Returns the dropped paths.
    fn prune(&mut self, keep: &BTreeSet<String>) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Lockfile
// ---------------------------------------------------------------------------

/// The persisted lockfile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    /// Schema version.
    pub version: u32,

    /// Id of the last generation run that completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<String>,

    /// Tracking records keyed by logical path (relative to the output root).
    #[serde(default)]
    pub tracked_files: BTreeMap<String, TrackedFile>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self {
            version: LOCKFILE_VERSION,
            generation_id: None,
            tracked_files: BTreeMap::new(),
        }
    }
}

impl Lockfile {
    /// Path of the lockfile for an output directory.
    #[must_use]
    pub fn path_for(out_dir: &Path) -> PathBuf {
        crate::state_dir(out_dir).join("lock.json")
    }

    /// Load the lockfile for `out_dir`; missing file → empty lockfile.
    ///
    /// # Errors
    /// Returns [`RteError::Lockfile`] on unreadable or malformed files and on
    /// unsupported schema versions.
    pub fn load(out_dir: &Path) -> Result<Self, RteError> {
        let path = Self::path_for(out_dir);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(RteError::Lockfile {
                    path,
                    detail: format!("could not read file: {e}"),
                });
            }
        };
        let lock: Self = serde_json::from_str(&text).map_err(|e| RteError::Lockfile {
            path: path.clone(),
            detail: format!("line {}: {e}", e.line()),
        })?;
        if lock.version > LOCKFILE_VERSION {
            return Err(RteError::Lockfile {
                path,
                detail: format!(
                    "schema version {} is newer than supported version {LOCKFILE_VERSION}",
                    lock.version
                ),
            });
        }
        Ok(lock)
    }

    /// Write the lockfile atomically (temp file + rename).
    ///
    /// # Errors
    /// Returns [`RteError::Lockfile`] if the file cannot be written.
    pub fn save(&self, out_dir: &Path) -> Result<(), RteError> {
        let path = Self::path_for(out_dir);
        let fail = |detail: String| RteError::Lockfile {
            path: path.clone(),
            detail,
        };
        let dir = path
            .parent()
            .ok_or_else(|| fail("lockfile path has no parent".to_owned()))?;
        std::fs::create_dir_all(dir).map_err(|e| fail(format!("could not create directory: {e}")))?;

        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| fail(format!("could not serialize: {e}")))?;
        json.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| fail(format!("could not create temp file: {e}")))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| fail(format!("could not write temp file: {e}")))?;
        tmp.persist(&path)
            .map_err(|e| fail(format!("could not replace lockfile: {e}")))?;
        tracing::debug!(path = %path.display(), files = self.tracked_files.len(), "saved lockfile");
        Ok(())
    }
}

impl GenConfigAccessor for Lockfile {
    fn tracked_file(&self, path: &str) -> Option<TrackedFile> {
        self.tracked_files.get(path).cloned()
    }

    fn update_tracked_file(&mut self, path: &str, update: TrackedUpdate) {
        let entry = self.tracked_files.entry(path.to_owned()).or_default();
        entry.pristine_blob_hash = Some(update.pristine_blob_hash);
        if update.last_write_checksum.is_some() {
            entry.last_write_checksum = update.last_write_checksum;
        }
        if entry.id.is_none() {
            entry.id = update.id;
        }
    }

    fn prune(&mut self, keep: &BTreeSet<String>) -> Vec<String> {
        let dropped: Vec<String> = self
            .tracked_files
            .keys()
            .filter(|path| !keep.contains(*path))
            .cloned()
            .collect();
        for path in &dropped {
            self.tracked_files.remove(path);
        }
        dropped
    }
}
