//! Index (staging area) operations for [`GixRepo`]: reading entries with
//! their merge stage, and staging a path as unmerged.

use gix::bstr::{BStr, ByteSlice};
use gix::index::entry::{Flags, Mode, Stage, Stat};

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::objects_impl::{from_gix_oid, to_gix_oid};
use crate::types::*;

fn gix_mode_to_entry_mode(mode: Mode) -> Option<EntryMode> {
    Some(match mode {
        Mode::FILE => EntryMode::Blob,
        Mode::FILE_EXECUTABLE => EntryMode::BlobExecutable,
        Mode::SYMLINK => EntryMode::Link,
        Mode::DIR => EntryMode::Tree,
        Mode::COMMIT => EntryMode::Commit,
        _ => return None,
    })
}

const fn stage_number(stage: Stage) -> u8 {
    match stage {
        Stage::Unconflicted => 0,
        Stage::Base => 1,
        Stage::Ours => 2,
        Stage::Theirs => 3,
    }
}

/// Load the index, or an empty one if the repository has never staged anything.
fn load_index(local: &gix::Repository) -> Result<gix::index::File, GitError> {
    let path = local.index_path();
    if !path.exists() {
        return Ok(gix::index::File::from_state(
            gix::index::State::new(local.object_hash()),
            path,
        ));
    }
    local.open_index().map_err(|e| GitError::BackendError {
        message: format!("failed to open index: {e}"),
    })
}

pub fn read_index(repo: &GixRepo) -> Result<Vec<IndexEntry>, GitError> {
    let local = repo.local();
    let index = load_index(&local)?;

    let mut entries = Vec::with_capacity(index.entries().len());
    for entry in index.entries() {
        let Ok(path) = entry.path(&index).to_str() else {
            tracing::debug!("skipping index entry with non-UTF-8 path");
            continue;
        };
        let Some(mode) = gix_mode_to_entry_mode(entry.mode) else {
            continue;
        };
        entries.push(IndexEntry {
            path: path.to_owned(),
            mode,
            oid: from_gix_oid(&entry.id)?,
            stage: stage_number(entry.stage()),
        });
    }
    Ok(entries)
}

pub fn set_conflict_state(
    repo: &GixRepo,
    path: &str,
    base: Option<GitOid>,
    ours: GitOid,
    theirs: GitOid,
    executable: bool,
) -> Result<(), GitError> {
    if path.is_empty() || path.starts_with('/') || path.split('/').any(|c| c == ".." || c.is_empty())
    {
        return Err(GitError::BackendError {
            message: format!("refusing to stage invalid index path '{path}'"),
        });
    }

    let local = repo.local();
    let mut index = load_index(&local)?;
    let target: &BStr = path.as_bytes().as_bstr();

    index.remove_entries(|_, entry_path, _| entry_path == target);
    // The cached tree extension would describe a resolved state.
    index.remove_tree();

    let mode = if executable {
        Mode::FILE_EXECUTABLE
    } else {
        Mode::FILE
    };
    let stages = [
        (Stage::Base, base),
        (Stage::Ours, Some(ours)),
        (Stage::Theirs, Some(theirs)),
    ];
    for (stage, oid) in stages {
        if let Some(oid) = oid {
            index.dangerously_push_entry(
                Stat::default(),
                to_gix_oid(oid),
                Flags::from_stage(stage),
                mode,
                target,
            );
        }
    }
    index.sort_entries();

    index
        .write(gix::index::write::Options::default())
        .map_err(|e| GitError::BackendError {
            message: format!("failed to write index while staging conflict for '{path}': {e}"),
        })?;
    tracing::debug!(path, has_base = base.is_some(), "staged conflict in index");
    Ok(())
}
