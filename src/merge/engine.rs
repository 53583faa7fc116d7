//! Batch merge driver.
//!
//! One batch is one generator run:
//!
//! 1. Look up tracking state for every generated file. Deleted files are
//!    skipped; moved files are merged at their new location.
//! 2. Merge every file on a bounded worker pool. Workers pull jobs from a
//!    bounded channel and send results back on another; nothing is shared
//!    through locks.
//! 3. Abort on cancellation or any fatal per-file error. The shadow branch and
//!    the lockfile are untouched in that case.
//! 4. Stage conflicted paths in the index as stage 1/2/3.
//! 5. Commit the pristine snapshot and publish the generation ref.
//! 6. Refresh lockfile records.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use roundtrip_git::{GitOid, GitRepo, GixRepo};

use crate::config::RteConfig;
use crate::diff::parse_blob_hash;
use crate::error::{GitResultExt as _, RteError};
use crate::identity::Identity;
use crate::lockfile::{GenConfigAccessor, TrackedFile, TrackedUpdate, checksum};
use crate::scanner::relative_slash_path;
use crate::shadow::{ShadowManager, Snapshot};
use crate::validate_relative_path;

use super::history::{GitHistoryProvider, HistoryProvider, is_missing};
use super::text::TextMerger;
use super::types::{FileMode, MergeInput, MergeResult, MergeStatus, Merger, VirtualFile};

/// Per-batch options.
#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    /// Publish the snapshot as `refs/speakeasy/gen/<id>`.
    pub generation_id: Option<String>,
    /// Drop lockfile records for paths the generator no longer emits.
    pub prune: bool,
}

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct BatchReport {
    /// Per-file outcomes, sorted by path.
    pub results: Vec<MergeResult>,
    /// The pristine snapshot the shadow branch now points to.
    pub snapshot: Snapshot,
    /// Background push of the generation ref, if one was started.
    pub publish: Option<JoinHandle<()>>,
    /// Lockfile records removed by pruning.
    pub pruned: Vec<String>,
}

impl BatchReport {
    /// `true` if any file was left with conflict markers.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        self.results.iter().any(MergeResult::has_conflicts)
    }

    /// On-disk paths of conflicted files.
    #[must_use]
    pub fn conflicted_paths(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.has_conflicts())
            .map(|r| r.disk_path.as_str())
            .collect()
    }

    /// Number of files with the given status.
    #[must_use]
    pub fn count(&self, status: MergeStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// A worker's output: the public result plus what conflict staging needs.
struct Merged {
    result: MergeResult,
    base: Option<GitOid>,
    ours: Option<Vec<u8>>,
}

/// The round-trip merge engine for one output directory.
pub struct Engine {
    repo: Arc<dyn GitRepo>,
    history: Arc<dyn HistoryProvider>,
    merger: Arc<dyn Merger>,
    shadow: ShadowManager,
    out_dir: PathBuf,
    /// `out_dir` relative to the repository root; `None` for bare repos.
    repo_prefix: Option<String>,
    concurrency: usize,
    header_lines: usize,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    /// Engine over the repository containing `out_dir`, creating the
    /// directory if needed. Relative paths resolve against the working
    /// directory.
    ///
    /// # Errors
    /// Fails if no repository is found or `out_dir` lies outside it.
    pub fn open(out_dir: &Path, config: &RteConfig) -> Result<Self, RteError> {
        std::fs::create_dir_all(out_dir).map_err(|e| RteError::io(out_dir, e))?;
        let out_dir = out_dir
            .canonicalize()
            .map_err(|e| RteError::io(out_dir, e))?;
        let repo = GixRepo::open(&out_dir).op("open", out_dir.display())?;
        Self::new(Arc::new(repo), &out_dir, config)
    }

    /// Engine with the git-backed history provider and the text merger.
    ///
    /// # Errors
    /// Fails if `out_dir` cannot be created or lies outside the worktree.
    pub fn new(repo: Arc<dyn GitRepo>, out_dir: &Path, config: &RteConfig) -> Result<Self, RteError> {
        std::fs::create_dir_all(out_dir).map_err(|e| RteError::io(out_dir, e))?;
        let out_dir = out_dir
            .canonicalize()
            .map_err(|e| RteError::io(out_dir, e))?;

        let repo_prefix = match repo.workdir() {
            Some(workdir) => {
                let workdir = workdir
                    .canonicalize()
                    .map_err(|e| RteError::io(workdir, e))?;
                let prefix = relative_slash_path(&workdir, &out_dir).ok_or_else(|| {
                    RteError::InvalidPath {
                        path: out_dir.display().to_string(),
                    }
                })?;
                Some(prefix)
            }
            None => None,
        };

        Ok(Self {
            history: Arc::new(GitHistoryProvider::new(Arc::clone(&repo))),
            merger: Arc::new(TextMerger),
            shadow: ShadowManager::new(Arc::clone(&repo), config.shadow.clone())?,
            repo,
            out_dir,
            repo_prefix,
            concurrency: config.merge.effective_concurrency(),
            header_lines: config.scan.header_lines,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the pristine content source.
    #[must_use]
    pub fn with_history(mut self, history: Arc<dyn HistoryProvider>) -> Self {
        self.history = history;
        self
    }

    /// Replace the content merger.
    #[must_use]
    pub fn with_merger(mut self, merger: Arc<dyn Merger>) -> Self {
        self.merger = merger;
        self
    }

    /// Flag that aborts the next or running batch when set. Cleared when
    /// that [`process_batch`](Self::process_batch) call returns.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// The shadow branch manager.
    #[must_use]
    pub const fn shadow(&self) -> &ShadowManager {
        &self.shadow
    }

    /// The repository.
    #[must_use]
    pub fn repo(&self) -> &Arc<dyn GitRepo> {
        &self.repo
    }

    /// Canonical output directory.
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Merge a generator run into the output directory.
    ///
    /// # Errors
    /// [`RteError::Cancelled`] if cancelled, [`RteError::BatchFailed`] if any
    /// file failed fatally, or the error that stopped conflict staging,
    /// snapshot commit, or publication. On error the shadow branch and
    /// `tracking` are left as they were.
    #[tracing::instrument(skip_all, fields(out_dir = %self.out_dir.display(), files = files.len()))]
    pub fn process_batch(
        &self,
        files: &[VirtualFile],
        tracking: &mut dyn GenConfigAccessor,
        options: &BatchOptions,
    ) -> Result<BatchReport, RteError> {
        let result = self.run_batch(files, tracking, options);
        self.cancel.store(false, Ordering::SeqCst);
        result
    }

    fn run_batch(
        &self,
        files: &[VirtualFile],
        tracking: &mut dyn GenConfigAccessor,
        options: &BatchOptions,
    ) -> Result<BatchReport, RteError> {
        if let Some(id) = &options.generation_id {
            self.shadow.generation_ref(id)?;
        }
        for file in files {
            validate_relative_path(&file.path)?;
        }

        let tracked: Vec<Option<TrackedFile>> =
            files.iter().map(|f| tracking.tracked_file(&f.path)).collect();
        for (file, tf) in files.iter().zip(&tracked) {
            if let Some(moved) = tf.as_ref().and_then(|t| t.moved_to.as_deref()) {
                validate_relative_path(moved)
                    .map_err(|_| RteError::InvalidPath { path: moved.to_owned() })?;
                tracing::debug!(path = %file.path, moved_to = %moved, "merging at moved location");
            }
        }

        let mut merged = self.merge_all(files, &tracked);
        if self.cancel.load(Ordering::SeqCst) {
            tracing::warn!("batch cancelled; pristine snapshot not advanced");
            return Err(RteError::Cancelled);
        }
        merged.sort_by(|a, b| a.result.path.cmp(&b.result.path));

        let failures: Vec<(String, String)> = merged
            .iter()
            .filter_map(|m| {
                m.result
                    .error
                    .as_ref()
                    .map(|e| (m.result.path.clone(), e.to_string()))
            })
            .collect();
        if !failures.is_empty() {
            tracing::warn!(failed = failures.len(), "batch aborted");
            return Err(RteError::BatchFailed { failures });
        }

        for m in merged.iter().filter(|m| m.result.has_conflicts()) {
            self.stage_conflict(m, files)?;
        }

        let snapshot = self.shadow.commit_state(files)?;
        let publish = match &options.generation_id {
            Some(id) => self.shadow.publish_generation(id, snapshot.commit)?,
            None => None,
        };

        for file in files {
            let Some(result) = merged.iter().find(|m| m.result.path == file.path) else {
                continue;
            };
            let Some(blob) = snapshot.blobs.get(&file.path) else {
                continue;
            };
            tracking.update_tracked_file(
                &file.path,
                TrackedUpdate {
                    pristine_blob_hash: blob.to_string(),
                    last_write_checksum: result.result.content.as_deref().map(checksum),
                    id: Identity::find_in_header(&file.content, self.header_lines),
                },
            );
        }

        let pruned = if options.prune {
            let keep: BTreeSet<String> = files.iter().map(|f| f.path.clone()).collect();
            let pruned = tracking.prune(&keep);
            if !pruned.is_empty() {
                tracing::info!(count = pruned.len(), "pruned stale lockfile records");
            }
            pruned
        } else {
            Vec::new()
        };

        let results: Vec<MergeResult> = merged.into_iter().map(|m| m.result).collect();
        let report = BatchReport {
            results,
            snapshot,
            publish,
            pruned,
        };
        tracing::info!(
            created = report.count(MergeStatus::Created),
            clean = report.count(MergeStatus::Clean),
            fast_forward = report.count(MergeStatus::FastForward),
            conflicts = report.count(MergeStatus::Conflict),
            binary = report.count(MergeStatus::Binary),
            skipped = report.count(MergeStatus::Skipped),
            "batch complete"
        );
        Ok(report)
    }

    fn merge_all(&self, files: &[VirtualFile], tracked: &[Option<TrackedFile>]) -> Vec<Merged> {
        let workers = self.concurrency.min(files.len()).max(1);
        let (job_tx, job_rx) = crossbeam::channel::bounded::<usize>(workers);
        let (result_tx, result_rx) = crossbeam::channel::unbounded::<Merged>();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for idx in job_rx {
                        if self.cancel.load(Ordering::SeqCst) {
                            continue;
                        }
                        let merged = self.merge_one(&files[idx], tracked[idx].as_ref());
                        if result_tx.send(merged).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            for idx in 0..files.len() {
                if self.cancel.load(Ordering::SeqCst) || job_tx.send(idx).is_err() {
                    break;
                }
            }
            drop(job_tx);

            result_rx.iter().collect()
        })
    }

    fn merge_one(&self, file: &VirtualFile, tracked: Option<&TrackedFile>) -> Merged {
        let disk_path = tracked.map_or(file.path.as_str(), |t| t.disk_path(&file.path));
        let mut result = MergeResult {
            path: file.path.clone(),
            disk_path: disk_path.to_owned(),
            content: None,
            status: MergeStatus::Skipped,
            conflicts: Vec::new(),
            error: None,
        };

        if tracked.is_some_and(|t| t.deleted) {
            tracing::debug!(path = %file.path, "skipping file deleted by the user");
            return Merged {
                result,
                base: None,
                ours: None,
            };
        }

        match self.merge_file(file, tracked, disk_path) {
            Ok(merged) => merged,
            Err(e) => {
                tracing::warn!(path = %file.path, error = %e, "merge failed");
                result.error = Some(e);
                Merged {
                    result,
                    base: None,
                    ours: None,
                }
            }
        }
    }

    fn merge_file(
        &self,
        file: &VirtualFile,
        tracked: Option<&TrackedFile>,
        disk_path: &str,
    ) -> Result<Merged, RteError> {
        let pristine_hash = tracked.and_then(|t| t.pristine_blob_hash.as_deref());
        let base = match pristine_hash {
            Some(hash) => match self.history.pristine(hash) {
                Ok(bytes) => Some(bytes),
                Err(e) if is_missing(&e) => {
                    tracing::warn!(path = %file.path, %hash, "pristine blob missing; treating as new file");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let target = self.out_dir.join(disk_path);
        let current = match std::fs::read(&target) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(RteError::io(&target, e)),
        };

        let output = self.merger.merge(MergeInput {
            base: base.as_deref(),
            current: current.as_deref(),
            new: &file.content,
            binary_hint: file.is_binary,
        })?;
        tracing::debug!(path = %file.path, status = %output.status, "merged");

        if current.as_deref() != Some(output.content.as_slice()) {
            write_file(&target, &output.content, file.mode)?;
        } else if file.mode.is_executable() {
            set_executable(&target)?;
        }

        let conflicted = output.status == MergeStatus::Conflict;
        Ok(Merged {
            base: if conflicted && base.is_some() {
                pristine_hash.and_then(parse_blob_hash)
            } else {
                None
            },
            ours: if conflicted { current } else { None },
            result: MergeResult {
                path: file.path.clone(),
                disk_path: disk_path.to_owned(),
                content: Some(output.content),
                status: output.status,
                conflicts: output.conflicts,
                error: None,
            },
        })
    }

    /// Record the conflict in the index so standard tooling sees it.
    fn stage_conflict(&self, merged: &Merged, files: &[VirtualFile]) -> Result<(), RteError> {
        let result = &merged.result;
        let Some(prefix) = &self.repo_prefix else {
            tracing::warn!(path = %result.path, "bare repository; conflict not staged");
            return Ok(());
        };
        let Some(file) = files.iter().find(|f| f.path == result.path) else {
            return Ok(());
        };

        let ours = self
            .repo
            .write_blob(merged.ours.as_deref().unwrap_or_default())
            .op("write_blob", &result.disk_path)?;
        let theirs = self
            .repo
            .write_blob(&file.content)
            .op("write_blob", &result.path)?;
        let index_path = if prefix.is_empty() {
            result.disk_path.clone()
        } else {
            format!("{prefix}/{}", result.disk_path)
        };
        self.repo
            .set_conflict_state(
                &index_path,
                merged.base,
                ours,
                theirs,
                file.mode.is_executable(),
            )
            .op("set_conflict_state", &index_path)?;
        tracing::info!(path = %index_path, "conflict staged");
        Ok(())
    }
}

fn write_file(path: &Path, content: &[u8], mode: FileMode) -> Result<(), RteError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RteError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| RteError::io(path, e))?;
    if mode.is_executable() {
        set_executable(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), RteError> {
    use std::os::unix::fs::PermissionsExt as _;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| RteError::io(path, e))?
        .permissions();
    let mode = perms.mode();
    if mode & 0o111 != 0o111 {
        perms.set_mode(mode | 0o111);
        std::fs::set_permissions(path, perms).map_err(|e| RteError::io(path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), RteError> {
    Ok(())
}
