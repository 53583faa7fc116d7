//! Reconcile lockfile state with what is on disk before a generation run.
//!
//! Detects files the user deleted, moved, or edited since the last run and
//! records deletions and moves in the lockfile so the merge engine honours
//! them.

use std::fmt;
use std::path::Path;

use crate::config::ScanConfig;
use crate::error::RteError;
use crate::lockfile::{Lockfile, checksum};
use crate::scanner::{ScanResult, Scanner};

/// What the detector found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeReport {
    /// `true` if any tracked file was deleted, moved, or modified.
    pub dirty: bool,
    /// Tracked paths whose on-disk content no longer matches the last write.
    pub modified: Vec<String>,
    /// Tracked paths newly marked deleted by this pass.
    pub deleted: Vec<String>,
    /// `(recorded path, new path)` for files newly marked moved.
    pub moved: Vec<(String, String)>,
}

/// Scan `out_dir` and update deleted/moved markers in `lock`.
///
/// # Errors
/// Propagates scanner failures.
#[tracing::instrument(skip(lock, scan_config), fields(out_dir = %out_dir.display()))]
pub fn detect_file_changes(
    out_dir: &Path,
    lock: &mut Lockfile,
    scan_config: &ScanConfig,
) -> Result<ChangeReport, RteError> {
    let scan = Scanner::new(out_dir, scan_config).scan()?;
    Ok(reconcile(out_dir, lock, &scan))
}

/// Apply a finished scan to `lock`.
pub fn reconcile(out_dir: &Path, lock: &mut Lockfile, scan: &ScanResult) -> ChangeReport {
    let mut report = ChangeReport::default();

    for (path, tracked) in &mut lock.tracked_files {
        let on_disk = out_dir.join(path.as_str());

        if let Some(id) = &tracked.id {
            // A copy elsewhere must not hide the original still in place.
            let found = if scan.path_to_id.get(path.as_str()) == Some(id) {
                Some(path.as_str())
            } else {
                scan.path_of(id)
            };
            match found {
                None if !on_disk.exists() => {
                    if !tracked.deleted {
                        report.deleted.push(path.clone());
                    }
                    tracked.deleted = true;
                    tracked.moved_to = None;
                    report.dirty = true;
                    continue;
                }
                Some(found) if found != path => {
                    if tracked.moved_to.as_deref() != Some(found) {
                        report.moved.push((path.clone(), found.to_owned()));
                    }
                    tracked.moved_to = Some(found.to_owned());
                    tracked.deleted = false;
                    report.dirty = true;
                    continue;
                }
                _ => {
                    tracked.deleted = false;
                    tracked.moved_to = None;
                }
            }
        }

        if let Some(expected) = &tracked.last_write_checksum
            && let Ok(content) = std::fs::read(&on_disk)
            && checksum(&content) != *expected
        {
            report.modified.push(path.clone());
            report.dirty = true;
        }
    }

    if report.dirty {
        tracing::info!(
            modified = report.modified.len(),
            deleted = report.deleted.len(),
            moved = report.moved.len(),
            "user changes detected in generated output"
        );
    }
    report
}

// ---------------------------------------------------------------------------
// FileChangeSummary
// ---------------------------------------------------------------------------

/// Status-style listing of every tracked file the user has touched, derived
/// from the lockfile after reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileChangeSummary {
    /// Tracked paths marked deleted.
    pub deleted: Vec<String>,
    /// `(recorded path, new path)` pairs.
    pub moved: Vec<(String, String)>,
    /// Paths whose content differs from the last write.
    pub modified: Vec<String>,
}

impl FileChangeSummary {
    /// Build a summary from reconciled lockfile state plus the modified list.
    #[must_use]
    pub fn new(lock: &Lockfile, report: &ChangeReport) -> Self {
        let mut summary = Self {
            modified: report.modified.clone(),
            ..Self::default()
        };
        for (path, tracked) in &lock.tracked_files {
            if tracked.deleted {
                summary.deleted.push(path.clone());
            } else if let Some(to) = &tracked.moved_to {
                summary.moved.push((path.clone(), to.clone()));
            }
        }
        summary
    }

    /// `true` if nothing was touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.moved.is_empty() && self.modified.is_empty()
    }

    /// Total number of touched files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deleted.len() + self.moved.len() + self.modified.len()
    }

    /// Render at most `max_lines` entries, then `... and N more`.
    #[must_use]
    pub fn format(&self, max_lines: usize) -> String {
        let lines = self
            .deleted
            .iter()
            .map(|p| format!("  D {p}"))
            .chain(self.moved.iter().map(|(a, b)| format!("  R {a} -> {b}")))
            .chain(self.modified.iter().map(|p| format!("  M {p}")));

        let mut out: Vec<String> = lines.take(max_lines).collect();
        let total = self.len();
        if total > max_lines {
            out.push(format!("  ... and {} more", total - max_lines));
        }
        out.join("\n")
    }
}

impl fmt::Display for FileChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(usize::MAX))
    }
}
