//! gix-backed object read/write operations.

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::*;

/// Signature used when the repository has no configured identity (CI runners).
const BOT_NAME: &str = "Round-trip Bot";
const BOT_EMAIL: &str = "bot@roundtrip.invalid";

/// Convert our `GitOid` to a `gix::ObjectId`.
pub(crate) fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from(*oid.as_bytes())
}

/// Convert a gix oid to our `GitOid`.
pub(crate) fn from_gix_oid(oid: &gix::oid) -> Result<GitOid, GitError> {
    let bytes: [u8; 20] = oid
        .as_bytes()
        .try_into()
        .map_err(|_| GitError::InvalidOid {
            value: oid.to_string(),
            reason: "only SHA-1 repositories are supported".to_owned(),
        })?;
    Ok(GitOid::from_bytes(bytes))
}

/// Convert a gix `EntryMode` to our `EntryMode`.
fn from_gix_entry_mode(mode: gix::objs::tree::EntryMode) -> EntryMode {
    match mode.kind() {
        gix::objs::tree::EntryKind::Tree => EntryMode::Tree,
        gix::objs::tree::EntryKind::Blob => EntryMode::Blob,
        gix::objs::tree::EntryKind::BlobExecutable => EntryMode::BlobExecutable,
        gix::objs::tree::EntryKind::Link => EntryMode::Link,
        gix::objs::tree::EntryKind::Commit => EntryMode::Commit,
    }
}

/// Convert our `EntryMode` to a gix `EntryKind`.
fn to_gix_entry_kind(mode: EntryMode) -> gix::objs::tree::EntryKind {
    match mode {
        EntryMode::Blob => gix::objs::tree::EntryKind::Blob,
        EntryMode::BlobExecutable => gix::objs::tree::EntryKind::BlobExecutable,
        EntryMode::Tree => gix::objs::tree::EntryKind::Tree,
        EntryMode::Link => gix::objs::tree::EntryKind::Link,
        EntryMode::Commit => gix::objs::tree::EntryKind::Commit,
    }
}

pub fn read_blob(repo: &GixRepo, oid: GitOid) -> Result<Vec<u8>, GitError> {
    let local = repo.local();
    let id = to_gix_oid(oid);
    if !local.has_object(id) {
        return Err(GitError::NotFound {
            message: format!("blob {oid}"),
        });
    }
    let mut blob = local.find_blob(id).map_err(|e| GitError::BackendError {
        message: format!("failed to read blob {oid}: {e}"),
    })?;
    Ok(blob.take_data())
}

pub fn has_object(repo: &GixRepo, oid: GitOid) -> bool {
    repo.local().has_object(to_gix_oid(oid))
}

pub fn read_tree(repo: &GixRepo, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
    let local = repo.local();
    let tree = local
        .find_tree(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound {
            message: format!("tree {oid}: {e}"),
        })?;

    let mut entries = Vec::new();
    for result in tree.iter() {
        let entry = result.map_err(|e| GitError::BackendError {
            message: format!("failed to decode entry of tree {oid}: {e}"),
        })?;
        entries.push(TreeEntry {
            name: entry.inner.filename.to_string(),
            mode: from_gix_entry_mode(entry.inner.mode),
            oid: from_gix_oid(entry.inner.oid)?,
        });
    }
    Ok(entries)
}

pub fn read_commit(repo: &GixRepo, oid: GitOid) -> Result<CommitInfo, GitError> {
    let local = repo.local();
    let commit = local
        .find_commit(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound {
            message: format!("commit {oid}: {e}"),
        })?;

    let decoded = commit.decode().map_err(|e| GitError::BackendError {
        message: format!("failed to decode commit {oid}: {e}"),
    })?;

    let tree_oid = from_gix_oid(&decoded.tree())?;
    let parents = decoded
        .parents()
        .map(|p| from_gix_oid(&p))
        .collect::<Result<Vec<_>, _>>()?;
    let message = decoded.message.to_string();

    let author_sig = decoded.author();
    let committer_sig = decoded.committer();

    Ok(CommitInfo {
        tree_oid,
        parents,
        message,
        author: format!("{} <{}>", author_sig.name, author_sig.email),
        committer: format!("{} <{}>", committer_sig.name, committer_sig.email),
    })
}

pub fn write_blob(repo: &GixRepo, data: &[u8]) -> Result<GitOid, GitError> {
    let local = repo.local();
    let id = local
        .write_blob(data)
        .map_err(|e| GitError::BackendError {
            message: format!("failed to write blob ({} bytes): {e}", data.len()),
        })?;
    from_gix_oid(id.as_ref())
}

pub fn write_tree(repo: &GixRepo, entries: &[TreeEntry]) -> Result<GitOid, GitError> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(git_tree_order);

    for pair in sorted.windows(2) {
        if pair[0].name == pair[1].name {
            return Err(GitError::BackendError {
                message: format!("duplicate tree entry '{}'", pair[0].name),
            });
        }
    }
    if let Some(bad) = sorted
        .iter()
        .find(|e| e.name.is_empty() || e.name.contains('/') || e.name == "." || e.name == "..")
    {
        return Err(GitError::BackendError {
            message: format!("invalid tree entry name '{}'", bad.name),
        });
    }

    let tree = gix::objs::Tree {
        entries: sorted
            .iter()
            .map(|e| gix::objs::tree::Entry {
                mode: to_gix_entry_kind(e.mode).into(),
                filename: e.name.as_str().into(),
                oid: to_gix_oid(e.oid),
            })
            .collect(),
    };
    let local = repo.local();
    let id = local
        .write_object(&tree)
        .map_err(|e| GitError::BackendError {
            message: format!("failed to write tree ({} entries): {e}", sorted.len()),
        })?;
    from_gix_oid(id.as_ref())
}

fn bot_signature() -> gix::actor::Signature {
    gix::actor::Signature {
        name: BOT_NAME.into(),
        email: BOT_EMAIL.into(),
        time: gix::date::Time::now_local_or_utc(),
    }
}

fn identity_or_bot<E: std::fmt::Display>(
    configured: Option<Result<gix::actor::SignatureRef<'_>, E>>,
    role: &str,
) -> gix::actor::Signature {
    match configured {
        Some(Ok(sig)) => sig.into(),
        Some(Err(e)) => {
            tracing::debug!(error = %e, role, "unreadable identity; using bot signature");
            bot_signature()
        }
        None => bot_signature(),
    }
}

/// Committer for new commits and reflog entries.
pub(crate) fn committer_signature(local: &gix::Repository) -> gix::actor::Signature {
    identity_or_bot(local.committer(), "committer")
}

pub fn create_commit(
    repo: &GixRepo,
    tree: GitOid,
    parents: &[GitOid],
    message: &str,
) -> Result<GitOid, GitError> {
    let local = repo.local();

    let author = identity_or_bot(local.author(), "author");
    let committer = committer_signature(&local);

    let commit = gix::objs::Commit {
        message: message.into(),
        tree: to_gix_oid(tree),
        author,
        committer,
        encoding: None,
        parents: parents.iter().map(|p| to_gix_oid(*p)).collect(),
        extra_headers: Default::default(),
    };
    let id = local
        .write_object(&commit)
        .map_err(|e| GitError::BackendError {
            message: format!("failed to write commit for tree {tree}: {e}"),
        })?;
    from_gix_oid(id.as_ref())
}
