//! Pristine snapshot branch.
//!
//! The shadow branch (`refs/heads/sdk-pristine` by default) holds only
//! generator output, never user edits, so every merge base stays retrievable.
//! Each batch splices its blobs into the previous snapshot's tree, commits on
//! top of the previous snapshot, and advances the branch with a
//! compare-and-swap. A concurrent writer that wins the race forces a re-read
//! and re-splice; see [`retry`].
//!
//! Every generation run is also published as
//! `refs/speakeasy/gen/<generation-id>` so its objects stay reachable through
//! `git gc` and can be pushed to or fetched from a remote.

pub mod retry;
pub mod splice;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use roundtrip_git::{EntryMode, GitError, GitOid, GitRepo, RefName};

use crate::config::ShadowConfig;
use crate::error::{GitResultExt as _, RteError};
use crate::merge::types::VirtualFile;

pub use retry::{RetryPolicy, retry_on_conflict};
pub use splice::{TreeSplicer, flatten_tree};

/// A committed (or reused) pristine snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// The snapshot commit the branch now points to.
    pub commit: GitOid,
    /// Its root tree.
    pub tree: GitOid,
    /// The previous tip, if any.
    pub parent: Option<GitOid>,
    /// `false` when the batch changed nothing and the previous tip was kept.
    pub created: bool,
    /// Blob written for every path in the batch.
    pub blobs: BTreeMap<String, GitOid>,
}

/// Reads and advances the shadow branch.
#[derive(Clone)]
pub struct ShadowManager {
    repo: Arc<dyn GitRepo>,
    config: ShadowConfig,
    branch: RefName,
}

impl ShadowManager {
    /// A manager for the branch named in `config`.
    ///
    /// # Errors
    /// Fails if the configured branch is not a valid ref name.
    pub fn new(repo: Arc<dyn GitRepo>, config: ShadowConfig) -> Result<Self, RteError> {
        let branch = RefName::new(&config.branch)
            .map_err(GitError::from)
            .op("parse_ref", &config.branch)?;
        Ok(Self {
            repo,
            config,
            branch,
        })
    }

    /// The shadow branch ref.
    #[must_use]
    pub const fn branch(&self) -> &RefName {
        &self.branch
    }

    /// Current tip of the shadow branch.
    ///
    /// # Errors
    /// Fails if the ref cannot be read.
    pub fn tip(&self) -> Result<Option<GitOid>, RteError> {
        self.repo.read_ref(&self.branch).op("read_ref", &self.branch)
    }

    /// Every pristine file in the tip snapshot as `path → (mode, blob)`.
    ///
    /// # Errors
    /// Fails if the snapshot cannot be read.
    pub fn pristine_files(&self) -> Result<BTreeMap<String, (EntryMode, GitOid)>, RteError> {
        let Some(tip) = self.tip()? else {
            return Ok(BTreeMap::new());
        };
        let tree = self.repo.read_commit(tip).op("read_commit", tip)?.tree_oid;
        flatten_tree(self.repo.as_ref(), tree)
    }

    /// Persist `files` as the next pristine snapshot.
    ///
    /// Blobs are written once; the splice, commit, and ref update are retried
    /// when another writer advances the branch first.
    ///
    /// # Errors
    /// Git failures, or [`RteError::CasExhausted`] once retries run out.
    #[tracing::instrument(skip(self, files), fields(branch = %self.branch, files = files.len()))]
    pub fn commit_state(&self, files: &[VirtualFile]) -> Result<Snapshot, RteError> {
        let mut staged = BTreeMap::new();
        for file in files {
            let oid = self
                .repo
                .write_blob(&file.content)
                .op("write_blob", &file.path)?;
            staged.insert(file.path.clone(), (EntryMode::from(file.mode), oid));
        }

        let policy = RetryPolicy::from_config(&self.config);
        let snapshot = retry_on_conflict(policy, self.branch.as_str(), |attempt| {
            self.advance(&staged, attempt)
        })?;
        tracing::info!(
            commit = %snapshot.commit,
            created = snapshot.created,
            "pristine snapshot recorded"
        );
        Ok(snapshot)
    }

    fn advance(
        &self,
        staged: &BTreeMap<String, (EntryMode, GitOid)>,
        attempt: u32,
    ) -> Result<Snapshot, RteError> {
        let parent = self.tip()?;
        let base_tree = match parent {
            Some(commit) => Some(self.repo.read_commit(commit).op("read_commit", commit)?.tree_oid),
            None => None,
        };

        let mut splicer = TreeSplicer::new(self.repo.as_ref(), base_tree)?;
        for (path, (mode, oid)) in staged {
            splicer.upsert(path, *mode, *oid)?;
        }
        let tree = splicer.write()?;
        let blobs = staged.iter().map(|(p, (_, oid))| (p.clone(), *oid)).collect();

        if let Some(parent) = parent
            && base_tree == Some(tree)
        {
            tracing::debug!(%parent, "snapshot tree unchanged; keeping tip");
            return Ok(Snapshot {
                commit: parent,
                tree,
                parent: Some(parent),
                created: false,
                blobs,
            });
        }

        let parents: Vec<GitOid> = parent.into_iter().collect();
        let commit = self
            .repo
            .create_commit(tree, &parents, &self.config.message)
            .op("create_commit", tree)?;
        self.repo
            .update_ref(&self.branch, commit, Some(parent.unwrap_or(GitOid::ZERO)))
            .op("update_ref", &self.branch)?;
        tracing::debug!(%commit, attempt, "advanced shadow branch");

        Ok(Snapshot {
            commit,
            tree,
            parent,
            created: true,
            blobs,
        })
    }

    /// The ref a generation is published under.
    ///
    /// # Errors
    /// [`RteError::InvalidGenerationId`] unless `id` is made of ASCII letters,
    /// digits, `.`, `_` and `-`.
    pub fn generation_ref(&self, id: &str) -> Result<RefName, RteError> {
        let valid_chars = !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
        let invalid = || RteError::InvalidGenerationId { id: id.to_owned() };
        if !valid_chars || id.starts_with('.') {
            return Err(invalid());
        }
        RefName::new(&format!("{}{id}", self.config.generation_prefix)).map_err(|_| invalid())
    }

    /// Point the generation ref for `id` at `commit`, then push it in the
    /// background when pushing is enabled.
    ///
    /// The returned handle may be joined to wait for the push; dropping it
    /// leaves the push running detached.
    ///
    /// # Errors
    /// Fails if the id is invalid or the local ref cannot be written. Push
    /// failures are only logged.
    pub fn publish_generation(
        &self,
        id: &str,
        commit: GitOid,
    ) -> Result<Option<JoinHandle<()>>, RteError> {
        let name = self.generation_ref(id)?;
        self.repo
            .write_ref(&name, commit, &format!("rte: publish generation {id}"))
            .op("write_ref", &name)?;
        tracing::debug!(refname = %name, %commit, "published generation ref");

        let Some(remote) = self.config.remote.clone().filter(|_| self.config.push) else {
            return Ok(None);
        };
        let repo = Arc::clone(&self.repo);
        let refspec = format!("+{name}:{name}");
        let handle = std::thread::spawn(move || match repo.push_ref(&remote, &refspec) {
            Ok(()) => tracing::info!(%remote, %refspec, "pushed generation ref"),
            Err(e) => tracing::warn!(%remote, %refspec, error = %e, "failed to push generation ref"),
        });
        Ok(Some(handle))
    }

    /// Fetch the generation ref for `id` from the configured remote.
    ///
    /// Falls back to the local ref when no remote is configured or the fetch
    /// fails. Returns `None` if the generation is unknown in both places.
    ///
    /// # Errors
    /// Fails if the id is invalid or the local ref cannot be read.
    pub fn fetch_generation(&self, id: &str) -> Result<Option<GitOid>, RteError> {
        let name = self.generation_ref(id)?;
        if let Some(remote) = &self.config.remote {
            let refspec = format!("+{name}:{name}");
            if let Err(e) = self.repo.fetch_ref(remote, &refspec) {
                tracing::warn!(%remote, %refspec, error = %e, "fetch failed; using local generation ref");
            }
        }
        self.repo.read_ref(&name).op("read_ref", &name)
    }

    /// All published generations as `(id, commit)`, sorted by id.
    ///
    /// # Errors
    /// Fails if refs cannot be listed.
    pub fn list_generations(&self) -> Result<Vec<(String, GitOid)>, RteError> {
        let prefix = &self.config.generation_prefix;
        let refs = self.repo.list_refs(prefix).op("list_refs", prefix)?;
        Ok(refs
            .into_iter()
            .filter_map(|(name, oid)| {
                name.as_str()
                    .strip_prefix(prefix.as_str())
                    .map(|id| (id.to_owned(), oid))
            })
            .collect())
    }
}
