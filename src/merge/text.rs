//! Line-based three-way text merge.
//!
//! The equality shortcuts run first (created, no-op, fast-forward, generator
//! silence). Only when both the user and the generator changed the file does
//! a diff3-style merge run: both edit scripts against the base are computed
//! with `similar`, overlapping edits are grouped into clusters, and each
//! cluster is resolved to one side or wrapped in conflict markers.

use std::ops::Range;

use similar::{Algorithm, DiffTag, capture_diff_slices};

use crate::diff::is_binary;
use crate::error::RteError;

use super::types::{Conflict, MergeInput, MergeOutput, MergeStatus, Merger};

/// Opening marker, followed by the user's text.
pub const MARKER_CURRENT: &str = "<<<<<<< current (user edits)";
/// Separator between the two sides.
pub const MARKER_SEPARATOR: &str = "=======";
/// Closing marker, preceded by the generated text.
pub const MARKER_NEW: &str = ">>>>>>> new (generated)";

const CONFLICT_MESSAGE: &str = "Overlapping changes between user edits and generated code";

/// The production [`Merger`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TextMerger;

impl Merger for TextMerger {
    fn merge(&self, input: MergeInput<'_>) -> Result<MergeOutput, RteError> {
        Ok(merge_contents(input))
    }
}

/// Run the merge decision procedure for one file.
#[must_use]
pub fn merge_contents(input: MergeInput<'_>) -> MergeOutput {
    let MergeInput {
        base,
        current,
        new,
        binary_hint,
    } = input;

    let (Some(base), Some(current)) = (base, current) else {
        return MergeOutput::clean(new, MergeStatus::Created);
    };
    if current == new {
        return MergeOutput::clean(current, MergeStatus::Clean);
    }
    if current == base {
        return MergeOutput::clean(new, MergeStatus::FastForward);
    }
    if new == base {
        return MergeOutput::clean(current, MergeStatus::Clean);
    }

    if binary_hint || is_binary(base) || is_binary(current) || is_binary(new) {
        return MergeOutput::clean(current, MergeStatus::Binary);
    }
    let (Ok(base), Ok(current), Ok(new)) = (
        std::str::from_utf8(base),
        std::str::from_utf8(current),
        std::str::from_utf8(new),
    ) else {
        return MergeOutput::clean(current, MergeStatus::Binary);
    };

    let merged = diff3(base, current, new);
    let conflicts = parse_conflict_markers(&merged);
    let status = if conflicts.is_empty() {
        MergeStatus::Clean
    } else {
        MergeStatus::Conflict
    };
    MergeOutput {
        content: merged.into_bytes(),
        status,
        conflicts,
    }
}

// ---------------------------------------------------------------------------
// diff3
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Current,
    New,
}

/// One contiguous change of a side relative to the base.
#[derive(Clone, Debug)]
struct Edit {
    side: Side,
    base: Range<usize>,
    lines: Range<usize>,
}

fn edit_script(side: Side, base: &[&str], other: &[&str]) -> Vec<Edit> {
    let mut edits: Vec<Edit> = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, base, other) {
        let (tag, b, o) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        match edits.last_mut() {
            Some(last) if last.base.end == b.start && last.lines.end == o.start => {
                last.base.end = b.end;
                last.lines.end = o.end;
            }
            _ => edits.push(Edit {
                side,
                base: b,
                lines: o,
            }),
        }
    }
    edits
}

/// Edits touching the same base region. Pure insertions conflict only when
/// they land at the same point or strictly inside the other range.
fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => a.start == b.start,
        (true, false) => b.start < a.start && a.start < b.end,
        (false, true) => a.start < b.start && b.start < a.end,
        (false, false) => a.start < b.end && b.start < a.end,
    }
}

struct Cluster {
    base: Range<usize>,
    edits: Vec<Edit>,
}

fn clusters(mut edits: Vec<Edit>) -> Vec<Cluster> {
    edits.sort_by_key(|e| (e.base.start, e.base.end));
    let mut out: Vec<Cluster> = Vec::new();
    for edit in edits {
        match out.last_mut() {
            Some(cluster) if overlaps(&cluster.base, &edit.base) => {
                cluster.base.start = cluster.base.start.min(edit.base.start);
                cluster.base.end = cluster.base.end.max(edit.base.end);
                cluster.edits.push(edit);
            }
            _ => out.push(Cluster {
                base: edit.base.clone(),
                edits: vec![edit],
            }),
        }
    }
    out
}

/// The side's text for base lines `range`, with that side's edits applied.
fn render_side(range: &Range<usize>, edits: &[&Edit], base: &[&str], lines: &[&str]) -> String {
    let mut out = String::new();
    let mut pos = range.start;
    for edit in edits {
        out.extend(base[pos..edit.base.start].iter().copied());
        out.extend(lines[edit.lines.clone()].iter().copied());
        pos = edit.base.end;
    }
    out.extend(base[pos..range.end].iter().copied());
    out
}

fn push_terminated(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.is_empty() && !text.ends_with('\n') {
        out.push('\n');
    }
}

fn diff3(base: &str, current: &str, new: &str) -> String {
    let base: Vec<&str> = base.split_inclusive('\n').collect();
    let current: Vec<&str> = current.split_inclusive('\n').collect();
    let new: Vec<&str> = new.split_inclusive('\n').collect();

    let mut edits = edit_script(Side::Current, &base, &current);
    edits.extend(edit_script(Side::New, &base, &new));

    let mut out = String::new();
    let mut pos = 0;
    for cluster in clusters(edits) {
        out.extend(base[pos..cluster.base.start].iter().copied());
        pos = cluster.base.end;

        let ours: Vec<&Edit> = cluster.edits.iter().filter(|e| e.side == Side::Current).collect();
        let theirs: Vec<&Edit> = cluster.edits.iter().filter(|e| e.side == Side::New).collect();
        let ours_text = render_side(&cluster.base, &ours, &base, &current);
        let theirs_text = render_side(&cluster.base, &theirs, &base, &new);

        if theirs.is_empty() || ours_text == theirs_text {
            out.push_str(&ours_text);
        } else if ours.is_empty() {
            out.push_str(&theirs_text);
        } else {
            out.push_str(MARKER_CURRENT);
            out.push('\n');
            push_terminated(&mut out, &ours_text);
            out.push_str(MARKER_SEPARATOR);
            out.push('\n');
            push_terminated(&mut out, &theirs_text);
            out.push_str(MARKER_NEW);
            out.push('\n');
        }
    }
    out.extend(base[pos..].iter().copied());
    out
}

/// Locate conflict regions in merged text.
#[must_use]
pub fn parse_conflict_markers(content: &str) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    let mut open: Option<usize> = None;
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if line.starts_with("<<<<<<< ") {
            open = Some(line_no);
        } else if line.starts_with(">>>>>>> ")
            && let Some(start_line) = open.take()
        {
            conflicts.push(Conflict {
                start_line,
                end_line: line_no,
                message: CONFLICT_MESSAGE.to_owned(),
            });
        }
    }
    conflicts
}
