//! The gix-backed implementation of [`GitRepo`].

use std::path::{Path, PathBuf};

use crate::error::GitError;
use crate::repo::GitRepo;
use crate::types::*;

/// A [`GitRepo`] implementation backed by [gix](https://github.com/GitoxideLabs/gitoxide).
///
/// Holds a [`gix::ThreadSafeRepository`]; every operation works on a
/// thread-local handle, so one `GixRepo` can be shared across worker threads.
///
/// Construct via [`GixRepo::open`] or [`GixRepo::open_at`].
pub struct GixRepo {
    pub(crate) repo: gix::ThreadSafeRepository,
    pub(crate) workdir: Option<PathBuf>,
    pub(crate) git_dir: PathBuf,
}

impl GixRepo {
    /// Open the git repository at or above `path`.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = gix::discover(path).map_err(|e| GitError::BackendError {
            message: format!("failed to discover repository from {}: {e}", path.display()),
        })?;
        Ok(Self::from_local(repo))
    }

    /// Open a git repository at exactly `path` (no parent discovery).
    pub fn open_at(path: &Path) -> Result<Self, GitError> {
        let repo = gix::open_opts(path, gix::open::Options::isolated()).map_err(|e| {
            GitError::BackendError {
                message: format!("failed to open repository at {}: {e}", path.display()),
            }
        })?;
        Ok(Self::from_local(repo))
    }

    fn from_local(repo: gix::Repository) -> Self {
        let workdir = repo.workdir().map(Path::to_path_buf);
        let git_dir = repo.git_dir().to_path_buf();
        Self {
            repo: repo.into_sync(),
            workdir,
            git_dir,
        }
    }

    /// A thread-local handle for one operation.
    pub(crate) fn local(&self) -> gix::Repository {
        self.repo.to_thread_local()
    }

    /// Directory git subprocesses should run in.
    pub(crate) fn command_dir(&self) -> &Path {
        self.workdir.as_deref().unwrap_or(&self.git_dir)
    }
}

impl GitRepo for GixRepo {
    fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    // === Refs ===
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError> {
        crate::refs_impl::read_ref(self, name)
    }

    fn write_ref(&self, name: &RefName, oid: GitOid, log_message: &str) -> Result<(), GitError> {
        crate::refs_impl::write_ref(self, name, oid, log_message)
    }

    fn atomic_ref_update(&self, edits: &[RefEdit]) -> Result<(), GitError> {
        crate::refs_impl::atomic_ref_update(self, edits)
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError> {
        crate::refs_impl::list_refs(self, prefix)
    }

    // === Object read ===
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError> {
        crate::objects_impl::read_blob(self, oid)
    }

    fn has_object(&self, oid: GitOid) -> bool {
        crate::objects_impl::has_object(self, oid)
    }

    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
        crate::objects_impl::read_tree(self, oid)
    }

    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError> {
        crate::objects_impl::read_commit(self, oid)
    }

    // === Object write ===
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError> {
        crate::objects_impl::write_blob(self, data)
    }

    fn write_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, GitError> {
        crate::objects_impl::write_tree(self, entries)
    }

    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
    ) -> Result<GitOid, GitError> {
        crate::objects_impl::create_commit(self, tree, parents, message)
    }

    // === Index ===
    fn read_index(&self) -> Result<Vec<IndexEntry>, GitError> {
        crate::index_impl::read_index(self)
    }

    fn set_conflict_state(
        &self,
        path: &str,
        base: Option<GitOid>,
        ours: GitOid,
        theirs: GitOid,
        executable: bool,
    ) -> Result<(), GitError> {
        crate::index_impl::set_conflict_state(self, path, base, ours, theirs, executable)
    }

    // === Remote ===
    fn fetch_ref(&self, remote: &str, refspec: &str) -> Result<(), GitError> {
        crate::remote_impl::fetch_ref(self, remote, refspec)
    }

    fn push_ref(&self, remote: &str, refspec: &str) -> Result<(), GitError> {
        crate::remote_impl::push_ref(self, remote, refspec)
    }
}
