//! The [`GitRepo`] trait, the abstraction boundary between the round-trip
//! engine and git.
//!
//! | Group        | Methods                                               |
//! |--------------|-------------------------------------------------------|
//! | Refs         | `read_ref`, `write_ref`, `update_ref`, `atomic_ref_update`, `list_refs` |
//! | Object read  | `read_blob`, `has_object`, `read_tree`, `read_commit` |
//! | Object write | `write_blob`, `write_tree`, `create_commit`           |
//! | Index        | `read_index`, `set_conflict_state`, `unmerged_paths`  |
//! | Remote       | `fetch_ref`, `push_ref`                               |

use std::path::Path;

use crate::error::GitError;
use crate::types::{CommitInfo, GitOid, IndexEntry, RefEdit, RefName, TreeEntry};

/// The git abstraction used by the round-trip engine.
///
/// The trait is object-safe and `Send + Sync` so one repository handle can be
/// shared by the merge worker pool (`Arc<dyn GitRepo>`).
pub trait GitRepo: Send + Sync {
    // -----------------------------------------------------------------------
    // Location
    // -----------------------------------------------------------------------

    /// The working tree root, or `None` for a bare repository.
    fn workdir(&self) -> Option<&Path>;

    /// The `.git` directory.
    fn git_dir(&self) -> &Path;

    // -----------------------------------------------------------------------
    // Refs
    //
    // Replaces: git rev-parse <ref>, git update-ref, git update-ref -d,
    //           git for-each-ref
    // -----------------------------------------------------------------------

    /// Resolve a ref to its OID, returning `None` if the ref does not exist.
    ///
    /// Replaces: `git rev-parse --verify -q <ref>`.
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError>;

    /// Create or overwrite a ref unconditionally.
    ///
    /// Replaces: `git update-ref -m <msg> <name> <oid>`.
    fn write_ref(&self, name: &RefName, oid: GitOid, log_message: &str) -> Result<(), GitError>;

    /// Apply a set of compare-and-swap ref updates atomically: either all
    /// succeed or none do.
    ///
    /// Replaces: `git update-ref --stdin` with `start`/`commit`.
    ///
    /// # Errors
    /// [`GitError::RefConflict`] when any ref's current value differs from its
    /// `expected_old_oid`, or when another writer holds the ref lock.
    fn atomic_ref_update(&self, edits: &[RefEdit]) -> Result<(), GitError>;

    /// Update a single ref. With `expected_old` set this is a compare-and-swap
    /// ([`GitOid::ZERO`] meaning "must not exist"); without, it overwrites.
    ///
    /// Replaces: `git update-ref <name> <new> [<old>]`.
    fn update_ref(
        &self,
        name: &RefName,
        new_oid: GitOid,
        expected_old: Option<GitOid>,
    ) -> Result<(), GitError> {
        match expected_old {
            Some(expected_old_oid) => self.atomic_ref_update(&[RefEdit {
                name: name.clone(),
                new_oid,
                expected_old_oid,
            }]),
            None => self.write_ref(name, new_oid, "update ref"),
        }
    }

    /// List refs whose names start with `prefix`, resolved to OIDs.
    ///
    /// Replaces: `git for-each-ref --format='%(refname) %(objectname)' <prefix>`.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError>;

    // -----------------------------------------------------------------------
    // Object read
    //
    // Replaces: git cat-file -p, git cat-file -e, git ls-tree
    // -----------------------------------------------------------------------

    /// Read the raw bytes of a blob.
    ///
    /// # Errors
    /// [`GitError::NotFound`] if no blob with this OID exists.
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// `true` if any object with this OID exists in the object database.
    fn has_object(&self, oid: GitOid) -> bool;

    /// Read the direct entries of a tree object.
    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError>;

    /// Read a commit object.
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError>;

    // -----------------------------------------------------------------------
    // Object write
    //
    // Replaces: git hash-object -w, git mktree, git commit-tree
    // -----------------------------------------------------------------------

    /// Store `data` as a blob. Identical bytes always yield the same OID.
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError>;

    /// Store a tree. Entries may be given in any order; they are sorted with
    /// [`git_tree_order`](crate::git_tree_order) before encoding.
    ///
    /// # Errors
    /// [`GitError::BackendError`] on duplicate or empty names.
    fn write_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, GitError>;

    /// Create a commit object. Does not move any ref.
    ///
    /// The repository's configured identity is used when present; otherwise a
    /// fixed bot signature.
    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
    ) -> Result<GitOid, GitError>;

    // -----------------------------------------------------------------------
    // Index
    //
    // Replaces: git ls-files --stage, git update-index --index-info
    // -----------------------------------------------------------------------

    /// Read all index entries, including conflict stages.
    fn read_index(&self) -> Result<Vec<IndexEntry>, GitError>;

    /// Mark `path` as unmerged: drop its existing entries and insert stage 1
    /// (`base`, omitted when `None`), stage 2 (`ours`) and stage 3 (`theirs`).
    ///
    /// `path` is relative to the repository root.
    fn set_conflict_state(
        &self,
        path: &str,
        base: Option<GitOid>,
        ours: GitOid,
        theirs: GitOid,
        executable: bool,
    ) -> Result<(), GitError>;

    /// Paths that have at least one non-zero stage entry, sorted and deduplicated.
    ///
    /// Replaces: `git diff --name-only --diff-filter=U`.
    fn unmerged_paths(&self) -> Result<Vec<String>, GitError> {
        let mut paths: Vec<String> = self
            .read_index()?
            .into_iter()
            .filter(|e| e.stage != 0)
            .map(|e| e.path)
            .collect();
        paths.dedup();
        Ok(paths)
    }

    // -----------------------------------------------------------------------
    // Remote
    //
    // Replaces: git fetch <remote> <refspec>, git push <remote> <refspec>
    // -----------------------------------------------------------------------

    /// Fetch `refspec` from `remote`.
    fn fetch_ref(&self, remote: &str, refspec: &str) -> Result<(), GitError>;

    /// Push `refspec` to `remote`.
    fn push_ref(&self, remote: &str, refspec: &str) -> Result<(), GitError>;
}
