//! Cumulative custom-code patch (`.rte/patches/custom-code.diff`).
//!
//! The patch holds every user edit relative to the pristine snapshot as one
//! unified diff. It is captured after the user edits, re-applied after a
//! regeneration, and removed once it no longer contains anything.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use roundtrip_git::GitRepo;

use crate::diff::{is_binary, parse_blob_hash, unified_diff};
use crate::error::{GitResultExt as _, RteError};
use crate::lockfile::Lockfile;
use crate::validate_relative_path;

/// Path of the custom-code patch for an output directory.
#[must_use]
pub fn patch_path(out_dir: &Path) -> PathBuf {
    crate::state_dir(out_dir).join("patches").join("custom-code.diff")
}

// ---------------------------------------------------------------------------
// Capture / persist
// ---------------------------------------------------------------------------

/// Diff every tracked file against its pristine blob.
///
/// Deleted files produce a `+++ /dev/null` diff. Moved files are diffed
/// from their logical path to their current location. Binary and non-UTF-8
/// files are left out.
///
/// # Errors
/// Fails if a recorded pristine blob cannot be read or a file exists but
/// cannot be read.
pub fn capture_patch(repo: &dyn GitRepo, out_dir: &Path, lock: &Lockfile) -> Result<String, RteError> {
    let mut patch = String::new();
    for (path, tracked) in &lock.tracked_files {
        let Some(oid) = tracked.pristine_blob_hash.as_deref().and_then(parse_blob_hash) else {
            continue;
        };
        let pristine = repo.read_blob(oid).op("read_blob", oid)?;

        let disk_path = tracked.disk_path(path);
        let full = out_dir.join(disk_path);
        let (current, new_label) = match std::fs::read(&full) {
            Ok(bytes) => (bytes, format!("b/{disk_path}")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Vec::new(), "/dev/null".to_owned())
            }
            Err(e) => return Err(RteError::io(&full, e)),
        };

        if is_binary(&pristine) || is_binary(&current) {
            tracing::debug!(%path, "binary file left out of custom-code patch");
            continue;
        }
        let (Ok(old), Ok(new)) = (std::str::from_utf8(&pristine), std::str::from_utf8(&current))
        else {
            continue;
        };
        patch.push_str(&unified_diff(old, new, &format!("a/{path}"), &new_label));
    }
    Ok(patch)
}

/// Write the patch, or remove the file when the patch is empty.
///
/// Returns the path written, or `None` if no patch file remains.
///
/// # Errors
/// Fails if the file cannot be written or removed.
pub fn save_patch(out_dir: &Path, patch: &str) -> Result<Option<PathBuf>, RteError> {
    let path = patch_path(out_dir);
    if patch.trim().is_empty() {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::info!(path = %path.display(), "custom-code patch now empty; removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RteError::io(&path, e)),
        }
        return Ok(None);
    }

    let dir = path.parent().unwrap_or(out_dir);
    std::fs::create_dir_all(dir).map_err(|e| RteError::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| RteError::io(dir, e))?;
    tmp.write_all(patch.as_bytes())
        .map_err(|e| RteError::io(tmp.path(), e))?;
    tmp.persist(&path)
        .map_err(|e| RteError::io(&path, e.error))?;
    Ok(Some(path))
}

/// Read the patch; `None` means no custom code is registered.
///
/// # Errors
/// Fails if the file exists but cannot be read.
pub fn load_patch(out_dir: &Path) -> Result<Option<String>, RteError> {
    let path = patch_path(out_dir);
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RteError::io(&path, e)),
    }
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// One line of a hunk body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HunkLine {
    /// Present on both sides.
    Context(String),
    /// Only on the old side.
    Remove(String),
    /// Only on the new side.
    Add(String),
}

/// A `@@` hunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based start line in the old file (line before, for empty ranges).
    pub old_start: usize,
    /// Lines taken from the old file.
    pub old_len: usize,
    /// Body lines, each including its line terminator when it had one.
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }

    fn reversed(&self) -> Self {
        let lines = self
            .lines
            .iter()
            .map(|l| match l {
                HunkLine::Context(s) => HunkLine::Context(s.clone()),
                HunkLine::Remove(s) => HunkLine::Add(s.clone()),
                HunkLine::Add(s) => HunkLine::Remove(s.clone()),
            })
            .collect::<Vec<_>>();
        let old_len = lines
            .iter()
            .filter(|l| !matches!(l, HunkLine::Add(_)))
            .count();
        Self {
            old_start: self.old_start,
            old_len,
            lines,
        }
    }
}

/// All hunks for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePatch {
    /// Old path without the `a/` prefix; `None` for `/dev/null`.
    pub old_path: Option<String>,
    /// New path without the `b/` prefix; `None` for `/dev/null`.
    pub new_path: Option<String>,
    /// Hunks in file order.
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    /// The same change undone.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            old_path: self.new_path.clone(),
            new_path: self.old_path.clone(),
            hunks: self.hunks.iter().map(Hunk::reversed).collect(),
        }
    }

    /// Path the patch is displayed under.
    #[must_use]
    pub fn display_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("<unknown>")
    }
}

fn strip_label(label: &str, prefix: &str) -> Option<String> {
    let label = label.split('\t').next().unwrap_or(label).trim_end();
    if label == "/dev/null" {
        None
    } else {
        Some(label.strip_prefix(prefix).unwrap_or(label).to_owned())
    }
}

/// `-a,b` → `(a, b)`; a missing length means 1.
fn parse_range(range: &str) -> Option<(usize, usize)> {
    let (start, len) = match range.split_once(',') {
        Some((s, l)) => (s.parse().ok()?, l.parse().ok()?),
        None => (range.parse().ok()?, 1),
    };
    Some((start, len))
}

fn parse_hunk_header(line: &str) -> Option<(usize, usize)> {
    let rest = line.strip_prefix("@@ -")?;
    let old = rest.split_whitespace().next()?;
    parse_range(old)
}

/// Parse unified-diff text.
///
/// # Errors
/// [`RteError::Patch`] when a hunk appears before a file header or a hunk
/// header is malformed.
pub fn parse_patch(text: &str) -> Result<Vec<FilePatch>, RteError> {
    let mut files: Vec<FilePatch> = Vec::new();
    let mut lines = text.split_inclusive('\n').enumerate().peekable();

    while let Some((idx, raw)) = lines.next() {
        let line = raw.trim_end_matches('\n');
        if let Some(old) = line.strip_prefix("--- ") {
            let Some((_, next)) = lines.next_if(|(_, l)| l.starts_with("+++ ")) else {
                return Err(RteError::Patch {
                    detail: format!("line {}: '---' header without '+++'", idx + 1),
                });
            };
            let new = next.trim_end_matches('\n').trim_start_matches("+++ ");
            files.push(FilePatch {
                old_path: strip_label(old, "a/"),
                new_path: strip_label(new, "b/"),
                hunks: Vec::new(),
            });
        } else if line.starts_with("@@ ") {
            let (old_start, old_len) = parse_hunk_header(line).ok_or_else(|| RteError::Patch {
                detail: format!("line {}: malformed hunk header '{line}'", idx + 1),
            })?;
            let file = files.last_mut().ok_or_else(|| RteError::Patch {
                detail: format!("line {}: hunk before any file header", idx + 1),
            })?;
            file.hunks.push(Hunk {
                old_start,
                old_len,
                lines: Vec::new(),
            });
        } else if let Some(hunk) = files.last_mut().and_then(|f| f.hunks.last_mut()) {
            match raw.as_bytes().first() {
                Some(b' ') => hunk.lines.push(HunkLine::Context(raw[1..].to_owned())),
                Some(b'-') => hunk.lines.push(HunkLine::Remove(raw[1..].to_owned())),
                Some(b'+') => hunk.lines.push(HunkLine::Add(raw[1..].to_owned())),
                Some(b'\\') => {
                    if let Some(HunkLine::Context(s) | HunkLine::Remove(s) | HunkLine::Add(s)) =
                        hunk.lines.last_mut()
                    {
                        if s.ends_with('\n') {
                            s.pop();
                        }
                    }
                }
                _ => {}
            }
        }
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// What happened when a patch was applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Files changed.
    pub applied: Vec<String>,
    /// `(path, reason)` for files left untouched because a hunk didn't fit.
    pub rejected: Vec<(String, String)>,
}

impl ApplyReport {
    /// `true` if every file applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Apply patch text to `out_dir`.
///
/// Hunks are matched by content, starting at the recorded position and
/// searching outward. A file with any hunk that doesn't fit is left
/// untouched and reported as rejected.
///
/// # Errors
/// [`RteError::Patch`] for unparseable text; I/O errors for unreadable or
/// unwritable files.
pub fn apply_patch(out_dir: &Path, text: &str) -> Result<ApplyReport, RteError> {
    let patches = parse_patch(text)?;
    apply_file_patches(out_dir, &patches)
}

/// Undo patch text previously applied to `out_dir`.
///
/// # Errors
/// Same as [`apply_patch`].
pub fn revert_patch(out_dir: &Path, text: &str) -> Result<ApplyReport, RteError> {
    let patches: Vec<FilePatch> = parse_patch(text)?.iter().map(FilePatch::reversed).collect();
    apply_file_patches(out_dir, &patches)
}

fn apply_file_patches(out_dir: &Path, patches: &[FilePatch]) -> Result<ApplyReport, RteError> {
    let mut report = ApplyReport::default();
    for patch in patches {
        let name = patch.display_path().to_owned();
        match apply_one(out_dir, patch)? {
            Ok(()) => report.applied.push(name),
            Err(reason) => {
                tracing::warn!(path = %name, %reason, "custom-code hunk rejected");
                report.rejected.push((name, reason));
            }
        }
    }
    Ok(report)
}

/// Outer `Err` is I/O; inner `Err` is a rejection reason.
fn apply_one(out_dir: &Path, patch: &FilePatch) -> Result<Result<(), String>, RteError> {
    let source = patch.old_path.as_deref().or(patch.new_path.as_deref());
    let Some(source) = source else {
        return Ok(Err("patch has no path".to_owned()));
    };
    for path in [&patch.old_path, &patch.new_path].into_iter().flatten() {
        if validate_relative_path(path).is_err() {
            return Ok(Err(format!("path {path} is outside the output directory")));
        }
    }
    let source_path = out_dir.join(source);

    let current = if patch.old_path.is_some() {
        match std::fs::read(&source_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // The file may already live at the new location.
                match patch.new_path.as_deref().map(|p| out_dir.join(p)) {
                    Some(target) if target.exists() => {
                        std::fs::read(&target).map_err(|e| RteError::io(&target, e))?
                    }
                    _ => return Ok(Err("file not found".to_owned())),
                }
            }
            Err(e) => return Err(RteError::io(&source_path, e)),
        }
    } else {
        Vec::new()
    };
    let Ok(current) = String::from_utf8(current) else {
        return Ok(Err("file is not valid UTF-8".to_owned()));
    };

    let mut lines: Vec<String> = current.split_inclusive('\n').map(str::to_owned).collect();
    let mut delta: isize = 0;
    for (n, hunk) in patch.hunks.iter().enumerate() {
        let old = hunk.old_lines();
        let new = hunk.new_lines();
        let hint = if hunk.old_len == 0 {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        let hint = hint.saturating_add_signed(delta).min(lines.len());
        let Some(pos) = find_block(&lines, &old, hint) else {
            return Ok(Err(format!("hunk {} does not match", n + 1)));
        };
        lines.splice(pos..pos + old.len(), new.iter().map(|s| (*s).to_owned()));
        delta += new.len() as isize - old.len() as isize;
    }

    match &patch.new_path {
        None => {
            if !lines.is_empty() {
                return Ok(Err("file has content beyond what the patch deletes".to_owned()));
            }
            std::fs::remove_file(&source_path).map_err(|e| RteError::io(&source_path, e))?;
        }
        Some(target) => {
            let target_path = out_dir.join(target);
            if let Some(parent) = target_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RteError::io(parent, e))?;
            }
            std::fs::write(&target_path, lines.concat()).map_err(|e| RteError::io(&target_path, e))?;
            if patch.old_path.as_deref().is_some_and(|old| old != target) && source_path.exists() {
                std::fs::remove_file(&source_path).map_err(|e| RteError::io(&source_path, e))?;
            }
        }
    }
    Ok(Ok(()))
}

/// Position of `block` in `lines`, preferring the one nearest `hint`.
fn find_block(lines: &[String], block: &[&str], hint: usize) -> Option<usize> {
    if block.is_empty() {
        return Some(hint);
    }
    let last = lines.len().checked_sub(block.len())?;
    let matches_at = |pos: usize| lines[pos..pos + block.len()].iter().zip(block).all(|(a, b)| a == b);
    let hint = hint.min(last);
    (0..=last).find_map(|dist| {
        let after = hint + dist;
        let before = hint.checked_sub(dist);
        if after <= last && matches_at(after) {
            Some(after)
        } else {
            before.filter(|&p| matches_at(p))
        }
    })
}
