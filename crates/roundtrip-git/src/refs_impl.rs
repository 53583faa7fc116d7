//! gix-backed ref operations.

use gix::refs::transaction::{Change, LogChange, PreviousValue, RefLog};
use gix::refs::{FullName, Target};

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::objects_impl::{committer_signature, from_gix_oid, to_gix_oid};
use crate::types::*;

type EditError = gix::reference::edit::Error;

/// Precondition failures and lock contention: another writer got there first.
fn is_cas_failure(err: &EditError) -> bool {
    use gix::refs::file::transaction::prepare::Error as Prepare;
    matches!(
        err,
        EditError::FileTransactionPrepare(
            Prepare::MustNotExist { .. }
                | Prepare::MustExist { .. }
                | Prepare::ReferenceOutOfDate { .. }
                | Prepare::LockAcquire { .. }
                | Prepare::PackedTransactionAcquire(_)
        )
    )
}

/// Commit `edits` in one transaction. Reflog entries are attributed to the
/// configured committer, or the bot signature when there is none.
fn commit_edits(
    repo: &GixRepo,
    edits: Vec<gix::refs::transaction::RefEdit>,
) -> Result<(), EditError> {
    let local = repo.local();
    let committer = committer_signature(&local);
    let mut time = gix::date::parse::TimeBuf::default();
    local.edit_references_as(edits, Some(committer.to_ref(&mut time)))?;
    Ok(())
}

fn full_name(name: &RefName) -> Result<FullName, GitError> {
    name.as_str()
        .try_into()
        .map_err(|e: gix::validate::reference::name::Error| GitError::InvalidRefName {
            value: name.to_string(),
            reason: e.to_string(),
        })
}

pub fn read_ref(repo: &GixRepo, name: &RefName) -> Result<Option<GitOid>, GitError> {
    let local = repo.local();
    match local.try_find_reference(name.as_str()) {
        Ok(Some(mut r)) => {
            let id = r.peel_to_id_in_place().map_err(|e| GitError::BackendError {
                message: format!("failed to peel {name}: {e}"),
            })?;
            Ok(Some(from_gix_oid(id.as_ref())?))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(GitError::BackendError {
            message: format!("failed to read {name}: {e}"),
        }),
    }
}

pub fn write_ref(
    repo: &GixRepo,
    name: &RefName,
    oid: GitOid,
    log_message: &str,
) -> Result<(), GitError> {
    let edit = gix::refs::transaction::RefEdit {
        change: Change::Update {
            log: LogChange {
                mode: RefLog::AndReference,
                force_create_reflog: false,
                message: log_message.into(),
            },
            expected: PreviousValue::Any,
            new: Target::Object(to_gix_oid(oid)),
        },
        name: full_name(name)?,
        deref: false,
    };
    commit_edits(repo, vec![edit]).map_err(|e| GitError::BackendError {
        message: format!("failed to set {name} to {oid}: {e}"),
    })
}

pub fn atomic_ref_update(repo: &GixRepo, edits: &[RefEdit]) -> Result<(), GitError> {
    let gix_edits: Vec<gix::refs::transaction::RefEdit> = edits
        .iter()
        .map(|edit| {
            let name = full_name(&edit.name)?;

            let expected = if edit.expected_old_oid.is_zero() {
                PreviousValue::MustNotExist
            } else {
                PreviousValue::MustExistAndMatch(Target::Object(to_gix_oid(edit.expected_old_oid)))
            };

            Ok(gix::refs::transaction::RefEdit {
                change: Change::Update {
                    log: LogChange {
                        mode: RefLog::AndReference,
                        force_create_reflog: false,
                        message: format!("update to {}", edit.new_oid).into(),
                    },
                    expected,
                    new: Target::Object(to_gix_oid(edit.new_oid)),
                },
                name,
                deref: false,
            })
        })
        .collect::<Result<Vec<_>, GitError>>()?;

    commit_edits(repo, gix_edits).map_err(|e| {
        let message = e.to_string();
        if is_cas_failure(&e) {
            let ref_name = edits
                .iter()
                .map(|e| e.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::debug!(%ref_name, %message, "ref transaction precondition failed");
            GitError::RefConflict { ref_name, message }
        } else {
            GitError::BackendError { message }
        }
    })?;
    Ok(())
}

pub fn list_refs(repo: &GixRepo, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError> {
    let local = repo.local();
    let platform = local.references().map_err(|e| GitError::BackendError {
        message: e.to_string(),
    })?;
    let refs_iter = platform
        .prefixed(prefix)
        .map_err(|e| GitError::BackendError {
            message: format!("failed to list refs under {prefix}: {e}"),
        })?;

    let mut result = Vec::new();
    for r in refs_iter {
        let mut r = r.map_err(|e| GitError::BackendError {
            message: e.to_string(),
        })?;
        let name = r.name().as_bstr().to_string();
        let id = r.peel_to_id_in_place().map_err(|e| GitError::BackendError {
            message: format!("failed to peel {name}: {e}"),
        })?;
        if let Ok(ref_name) = RefName::new(&name) {
            result.push((ref_name, from_gix_oid(id.as_ref())?));
        }
    }
    result.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    Ok(result)
}
