//! Inspect and restore pristine (generated, un-edited) file versions.

use std::fmt;
use std::path::Path;

use roundtrip_git::GitRepo;

use crate::diff::parse_blob_hash;
use crate::error::{GitResultExt as _, RteError};
use crate::lockfile::{Lockfile, TrackedFile};

/// What [`restore_pristine_file`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The file was rewritten with its pristine content.
    Restored,
    /// The file already matched; nothing was written.
    AlreadyPristine,
}

impl fmt::Display for RestoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restored => f.write_str("restored"),
            Self::AlreadyPristine => f.write_str("already pristine"),
        }
    }
}

fn tracked<'a>(lock: &'a Lockfile, path: &str) -> Result<&'a TrackedFile, RteError> {
    lock.tracked_files.get(path).ok_or_else(|| RteError::NotTracked {
        path: path.to_owned(),
    })
}

fn read_pristine(repo: &dyn GitRepo, path: &str, tf: &TrackedFile) -> Result<Vec<u8>, RteError> {
    let no_pristine = || RteError::NoPristine {
        path: path.to_owned(),
    };
    let hash = tf.pristine_blob_hash.as_deref().ok_or_else(no_pristine)?;
    let oid = parse_blob_hash(hash).ok_or_else(no_pristine)?;
    repo.read_blob(oid).op("read_blob", oid)
}

/// Pristine bytes of a tracked path.
///
/// # Errors
/// [`RteError::NotTracked`], [`RteError::NoPristine`], or a git read error.
pub fn show_pristine(repo: &dyn GitRepo, lock: &Lockfile, path: &str) -> Result<Vec<u8>, RteError> {
    read_pristine(repo, path, tracked(lock, path)?)
}

/// Overwrite the on-disk copy of `path` with its pristine content,
/// discarding user edits. Existing permissions are kept.
///
/// Moved files are restored at their current location.
///
/// # Errors
/// Lookup errors as for [`show_pristine`], or an I/O error writing the file.
pub fn restore_pristine_file(
    repo: &dyn GitRepo,
    out_dir: &Path,
    lock: &Lockfile,
    path: &str,
) -> Result<RestoreOutcome, RteError> {
    let tf = tracked(lock, path)?;
    let content = read_pristine(repo, path, tf)?;
    let target = out_dir.join(tf.disk_path(path));

    match std::fs::read(&target) {
        Ok(existing) if existing == content => return Ok(RestoreOutcome::AlreadyPristine),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RteError::io(parent, e))?;
            }
        }
        Err(e) => return Err(RteError::io(&target, e)),
    }

    // Truncating in place keeps the file's mode bits.
    std::fs::write(&target, &content).map_err(|e| RteError::io(&target, e))?;
    tracing::info!(%path, "restored pristine version");
    Ok(RestoreOutcome::Restored)
}

/// Restore every tracked file that has a pristine version and was not
/// deleted by the user.
///
/// # Errors
/// Stops at the first failure.
pub fn restore_pristine_all(
    repo: &dyn GitRepo,
    out_dir: &Path,
    lock: &Lockfile,
) -> Result<Vec<(String, RestoreOutcome)>, RteError> {
    lock.tracked_files
        .iter()
        .filter(|(_, tf)| !tf.deleted && tf.pristine_blob_hash.is_some())
        .map(|(path, _)| {
            restore_pristine_file(repo, out_dir, lock, path).map(|outcome| (path.clone(), outcome))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use roundtrip_git::GixRepo;
    use tempfile::TempDir;

    use super::*;

    fn setup() -> (TempDir, GixRepo) {
        let dir = TempDir::new().unwrap();
        let out = Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert!(out.status.success());
        let repo = GixRepo::open(dir.path()).unwrap();
        (dir, repo)
    }

    fn lock_with(path: &str, hash: Option<String>) -> Lockfile {
        let mut lock = Lockfile::default();
        lock.tracked_files.insert(
            path.to_owned(),
            TrackedFile {
                pristine_blob_hash: hash,
                ..TrackedFile::default()
            },
        );
        lock
    }

    #[test]
    fn restore_discards_edits_then_reports_pristine() {
        let (dir, repo) = setup();
        let oid = repo.write_blob(b"generated\n").unwrap();
        let lock = lock_with("a.go", Some(oid.to_string()));
        std::fs::write(dir.path().join("a.go"), "edited\n").unwrap();

        assert_eq!(show_pristine(&repo, &lock, "a.go").unwrap(), b"generated\n");
        assert_eq!(
            restore_pristine_file(&repo, dir.path(), &lock, "a.go").unwrap(),
            RestoreOutcome::Restored
        );
        assert_eq!(std::fs::read(dir.path().join("a.go")).unwrap(), b"generated\n");
        assert_eq!(
            restore_pristine_all(&repo, dir.path(), &lock).unwrap(),
            [("a.go".to_owned(), RestoreOutcome::AlreadyPristine)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn restore_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt as _;

        let (dir, repo) = setup();
        let oid = repo.write_blob(b"#!/bin/sh\n").unwrap();
        let lock = lock_with("run.sh", Some(oid.to_string()));
        let path = dir.path().join("run.sh");
        std::fs::write(&path, "edited\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        restore_pristine_file(&repo, dir.path(), &lock, "run.sh").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn untracked_and_baseless_paths_are_errors() {
        let (dir, repo) = setup();
        let lock = lock_with("a.go", None);
        assert!(matches!(
            show_pristine(&repo, &lock, "b.go"),
            Err(RteError::NotTracked { .. })
        ));
        assert!(matches!(
            restore_pristine_file(&repo, dir.path(), &lock, "a.go"),
            Err(RteError::NoPristine { .. })
        ));
    }
}
