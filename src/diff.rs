//! Per-file diffs between the pristine generated version and the working tree.
//!
//! Uses the `similar` crate for line diffing. All text is normalized to `\n`
//! line endings before diffing so CRLF checkouts don't show every line as
//! changed.

use std::fmt;
use std::path::Path;

use similar::{ChangeTag, TextDiff};

use roundtrip_git::{GitOid, GitRepo};

use crate::lockfile::Lockfile;

/// How many leading bytes are inspected by [`is_binary`].
pub const BINARY_SNIFF_LEN: usize = 8192;

/// Context lines around each hunk.
pub const CONTEXT_LINES: usize = 3;

/// Binary heuristic: a NUL byte within the first [`BINARY_SNIFF_LEN`] bytes.
#[must_use]
pub fn is_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

/// Convert `\r\n` and lone `\r` to `\n`.
#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Lines added and removed by a diff.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// Lines only in the new text.
    pub added: usize,
    /// Lines only in the old text.
    pub removed: usize,
}

impl DiffStats {
    /// Count changed lines between `old` and `new`.
    #[must_use]
    pub fn between(old: &str, new: &str) -> Self {
        let diff = TextDiff::from_lines(old, new);
        let mut stats = Self::default();
        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => stats.added += 1,
                ChangeTag::Delete => stats.removed += 1,
                ChangeTag::Equal => {}
            }
        }
        stats
    }

    /// `true` if nothing changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} -{}", self.added, self.removed)
    }
}

/// Unified diff of `old` → `new` with `a/`/`b/` style headers.
///
/// Returns an empty string when the texts are equal.
#[must_use]
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(old_label, new_label)
        .to_string()
}

// ---------------------------------------------------------------------------
// ComputeFileDiff
// ---------------------------------------------------------------------------

/// Result of diffing one tracked file against its pristine version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffOutcome {
    /// No pristine blob hash recorded for the path.
    NoPristine,
    /// No git repository to read the pristine blob from.
    RepoUnavailable,
    /// The recorded pristine blob is not in the object database.
    PristineMissing,
    /// The file does not exist on disk.
    FileMissing,
    /// Either side is binary.
    Binary,
    /// The working file matches the pristine version.
    Unchanged,
    /// The working file differs.
    Changed {
        /// Unified diff text, pristine → working.
        text: String,
        /// Added/removed line counts.
        stats: DiffStats,
    },
}

impl DiffOutcome {
    /// `true` if the user's copy differs from the pristine version.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. } | Self::FileMissing)
    }
}

impl fmt::Display for DiffOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPristine => f.write_str("(no pristine base available)"),
            Self::RepoUnavailable => f.write_str("(git repository not available)"),
            Self::PristineMissing => f.write_str("(pristine object not found in git)"),
            Self::FileMissing => f.write_str("(file not found on disk)"),
            Self::Binary => f.write_str("(binary file)"),
            Self::Unchanged => f.write_str("(no changes)"),
            Self::Changed { text, .. } => f.write_str(text),
        }
    }
}

/// One file's diff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDiff {
    /// Path relative to the output root.
    pub path: String,
    /// The pristine blob the diff was computed against.
    pub pristine_hash: Option<String>,
    /// What was found.
    pub outcome: DiffOutcome,
}

/// Diff `path` (relative to `out_dir`) against the pristine blob `pristine_hash`.
#[must_use]
pub fn compute_file_diff(
    out_dir: &Path,
    path: &str,
    pristine_hash: Option<&str>,
    repo: Option<&dyn GitRepo>,
) -> FileDiff {
    let outcome = file_diff_outcome(out_dir, path, pristine_hash, repo);
    FileDiff {
        path: path.to_owned(),
        pristine_hash: pristine_hash.map(str::to_owned),
        outcome,
    }
}

fn file_diff_outcome(
    out_dir: &Path,
    path: &str,
    pristine_hash: Option<&str>,
    repo: Option<&dyn GitRepo>,
) -> DiffOutcome {
    let Some(hash) = pristine_hash else {
        return DiffOutcome::NoPristine;
    };
    let Some(repo) = repo else {
        return DiffOutcome::RepoUnavailable;
    };
    let pristine = match parse_blob_hash(hash).map(|oid| repo.read_blob(oid)) {
        Some(Ok(bytes)) => bytes,
        _ => return DiffOutcome::PristineMissing,
    };
    let Ok(current) = std::fs::read(out_dir.join(path)) else {
        return DiffOutcome::FileMissing;
    };
    if is_binary(&pristine) || is_binary(&current) {
        return DiffOutcome::Binary;
    }

    let old = normalize_line_endings(&String::from_utf8_lossy(&pristine));
    let new = normalize_line_endings(&String::from_utf8_lossy(&current));
    let stats = DiffStats::between(&old, &new);
    if stats.is_empty() {
        return DiffOutcome::Unchanged;
    }
    DiffOutcome::Changed {
        text: unified_diff(&old, &new, &format!("a/{path}"), &format!("b/{path}")),
        stats,
    }
}

/// Accepts a bare 40-hex blob hash, optionally prefixed with `sha1:`.
#[must_use]
pub fn parse_blob_hash(hash: &str) -> Option<GitOid> {
    hash.strip_prefix("sha1:").unwrap_or(hash).parse().ok()
}

/// Diff every live tracked file and keep the ones the user changed.
#[must_use]
pub fn compute_tracked_diffs(out_dir: &Path, lock: &Lockfile, repo: &dyn GitRepo) -> Vec<FileDiff> {
    lock.tracked_files
        .iter()
        .filter(|(_, tf)| !tf.deleted)
        .map(|(path, tf)| {
            let mut diff = compute_file_diff(
                out_dir,
                tf.disk_path(path),
                tf.pristine_blob_hash.as_deref(),
                Some(repo),
            );
            diff.path.clone_from(path);
            diff
        })
        .filter(|d| d.outcome.is_changed())
        .collect()
}
