//! Core types for the round-trip merge.
//!
//! Defines what flows from the generator into the merge engine and what comes
//! back out per file.

use std::fmt;

use roundtrip_git::EntryMode;

use crate::error::RteError;

// ---------------------------------------------------------------------------
// MergeStatus
// ---------------------------------------------------------------------------

/// Per-file merge outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MergeStatus {
    /// No pristine base or no file on disk; the generated content was written.
    Created,
    /// Merged without conflicts (including no-op merges).
    Clean,
    /// The user had not edited the file; the generated content replaced it.
    FastForward,
    /// Overlapping edits; markers written and the path staged as unmerged.
    Conflict,
    /// Binary content on either side; the current file was left untouched.
    Binary,
    /// The user deleted the file; nothing was written.
    Skipped,
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Clean => "clean",
            Self::FastForward => "fast-forward",
            Self::Conflict => "conflict",
            Self::Binary => "binary",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// FileMode / VirtualFile
// ---------------------------------------------------------------------------

/// Mode of a generated file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// `100644`
    #[default]
    Regular,
    /// `100755`
    Executable,
}

impl FileMode {
    /// `true` for [`FileMode::Executable`].
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::Executable)
    }
}

impl From<FileMode> for EntryMode {
    fn from(mode: FileMode) -> Self {
        match mode {
            FileMode::Regular => Self::Blob,
            FileMode::Executable => Self::BlobExecutable,
        }
    }
}

/// A freshly generated file as emitted by the generator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualFile {
    /// Logical path, slash-separated, relative to the output root.
    pub path: String,
    /// Generated bytes.
    pub content: Vec<u8>,
    /// File mode.
    pub mode: FileMode,
    /// Generator-declared binary flag. The NUL-byte heuristic still applies
    /// when this is `false`.
    pub is_binary: bool,
}

impl VirtualFile {
    /// A regular text file.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            mode: FileMode::Regular,
            is_binary: false,
        }
    }

    /// Same file with a different mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }
}

// ---------------------------------------------------------------------------
// Conflict
// ---------------------------------------------------------------------------

/// One marker-delimited conflict region in merged output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    /// 1-indexed line of the `<<<<<<<` marker.
    pub start_line: usize,
    /// 1-indexed line of the `>>>>>>>` marker.
    pub end_line: usize,
    /// Human-readable description.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Merger capability
// ---------------------------------------------------------------------------

/// The three inputs of one file merge.
#[derive(Clone, Copy, Debug)]
pub struct MergeInput<'a> {
    /// Prior pristine content (`None` if never tracked or blob unavailable).
    pub base: Option<&'a [u8]>,
    /// On-disk content (`None` if the file does not exist).
    pub current: Option<&'a [u8]>,
    /// Freshly generated content.
    pub new: &'a [u8],
    /// Generator says the file is binary.
    pub binary_hint: bool,
}

/// What a [`Merger`] produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutput {
    /// Bytes to leave on disk.
    pub content: Vec<u8>,
    /// Outcome.
    pub status: MergeStatus,
    /// Conflict regions, empty unless `status` is [`MergeStatus::Conflict`].
    pub conflicts: Vec<Conflict>,
}

impl MergeOutput {
    pub(crate) fn clean(content: &[u8], status: MergeStatus) -> Self {
        Self {
            content: content.to_vec(),
            status,
            conflicts: Vec::new(),
        }
    }
}

/// Three-way content merge.
pub trait Merger: Send + Sync {
    /// Merge one file.
    ///
    /// # Errors
    /// Implementations may fail; a failure is fatal for the batch.
    fn merge(&self, input: MergeInput<'_>) -> Result<MergeOutput, RteError>;
}

// ---------------------------------------------------------------------------
// MergeResult
// ---------------------------------------------------------------------------

/// Outcome of one file in a batch.
#[derive(Debug)]
pub struct MergeResult {
    /// Logical path.
    pub path: String,
    /// Where the content lives on disk (differs from `path` after a move).
    pub disk_path: String,
    /// Content left on disk, `None` for skipped files and fatal failures.
    pub content: Option<Vec<u8>>,
    /// Outcome.
    pub status: MergeStatus,
    /// Conflict regions.
    pub conflicts: Vec<Conflict>,
    /// Fatal per-file error. Any such error aborts the batch.
    pub error: Option<RteError>,
}

impl MergeResult {
    /// `true` if the file was left with conflict markers.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        self.status == MergeStatus::Conflict
    }
}
