//! Partial tree rebuild.
//!
//! The previous snapshot's tree is loaded lazily into an arena of directory
//! nodes. Only directories on the path to an upserted file are expanded;
//! every other subtree stays a hash reference and is written back as-is.

use std::collections::BTreeMap;

use roundtrip_git::{EntryMode, GitOid, GitRepo, TreeEntry};

use crate::error::{GitResultExt as _, RteError};

#[derive(Clone, Debug)]
enum Slot {
    File { mode: EntryMode, oid: GitOid },
    Loaded(usize),
    Stored(GitOid),
}

#[derive(Debug, Default)]
struct DirNode {
    entries: BTreeMap<String, Slot>,
    /// Hash of the tree this node was loaded from, if unchanged.
    original: Option<GitOid>,
}

/// Splices files into an existing tree.
pub struct TreeSplicer<'a> {
    repo: &'a dyn GitRepo,
    nodes: Vec<DirNode>,
}

impl<'a> TreeSplicer<'a> {
    /// Start from `base` (the previous snapshot's root tree), or from an empty
    /// tree when there is no previous snapshot.
    ///
    /// # Errors
    /// Fails if the base tree cannot be read.
    pub fn new(repo: &'a dyn GitRepo, base: Option<GitOid>) -> Result<Self, RteError> {
        let mut splicer = Self {
            repo,
            nodes: Vec::new(),
        };
        let root = match base {
            Some(oid) => splicer.load(oid)?,
            None => DirNode::default(),
        };
        splicer.nodes.push(root);
        Ok(splicer)
    }

    fn load(&self, oid: GitOid) -> Result<DirNode, RteError> {
        let entries = self
            .repo
            .read_tree(oid)
            .op("read_tree", oid)?
            .into_iter()
            .map(|e| {
                let slot = if e.mode.is_tree() {
                    Slot::Stored(e.oid)
                } else {
                    Slot::File {
                        mode: e.mode,
                        oid: e.oid,
                    }
                };
                (e.name, slot)
            })
            .collect();
        Ok(DirNode {
            entries,
            original: Some(oid),
        })
    }

    /// Index of the child directory `name` under `parent`, expanding or
    /// creating it as needed. A file in the way is replaced.
    fn child_dir(&mut self, parent: usize, name: &str) -> Result<usize, RteError> {
        let node = match self.nodes[parent].entries.get(name) {
            Some(Slot::Loaded(idx)) => return Ok(*idx),
            Some(Slot::Stored(oid)) => self.load(*oid)?,
            Some(Slot::File { .. }) | None => DirNode::default(),
        };
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent]
            .entries
            .insert(name.to_owned(), Slot::Loaded(idx));
        Ok(idx)
    }

    /// Set `path` to the blob `oid`.
    ///
    /// # Errors
    /// [`RteError::InvalidPath`] for empty, absolute, or escaping paths;
    /// git errors when a subtree on the way cannot be read.
    pub fn upsert(&mut self, path: &str, mode: EntryMode, oid: GitOid) -> Result<(), RteError> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.iter().any(|p| p.is_empty() || *p == "." || *p == "..") {
            return Err(RteError::InvalidPath {
                path: path.to_owned(),
            });
        }
        let Some((file_name, dirs)) = parts.split_last() else {
            return Err(RteError::InvalidPath {
                path: path.to_owned(),
            });
        };

        let mut node = 0;
        self.nodes[node].original = None;
        for dir in dirs {
            node = self.child_dir(node, dir)?;
            self.nodes[node].original = None;
        }
        self.nodes[node]
            .entries
            .insert((*file_name).to_owned(), Slot::File { mode, oid });
        Ok(())
    }

    /// Write every modified directory bottom-up and return the root tree.
    ///
    /// # Errors
    /// Fails if a tree object cannot be written.
    pub fn write(&self) -> Result<GitOid, RteError> {
        self.write_node(0)
    }

    fn write_node(&self, idx: usize) -> Result<GitOid, RteError> {
        let node = &self.nodes[idx];
        if let Some(oid) = node.original {
            return Ok(oid);
        }
        let mut entries = Vec::with_capacity(node.entries.len());
        for (name, slot) in &node.entries {
            let (mode, oid) = match slot {
                Slot::File { mode, oid } => (*mode, *oid),
                Slot::Stored(oid) => (EntryMode::Tree, *oid),
                Slot::Loaded(child) => (EntryMode::Tree, self.write_node(*child)?),
            };
            entries.push(TreeEntry {
                name: name.clone(),
                mode,
                oid,
            });
        }
        self.repo.write_tree(&entries).op("write_tree", "<spliced tree>")
    }
}

/// Flatten a tree into `path → (mode, blob)` for every non-tree entry.
///
/// # Errors
/// Fails if any subtree cannot be read.
pub fn flatten_tree(
    repo: &dyn GitRepo,
    tree: GitOid,
) -> Result<BTreeMap<String, (EntryMode, GitOid)>, RteError> {
    let mut out = BTreeMap::new();
    let mut stack = vec![(String::new(), tree)];
    while let Some((prefix, oid)) = stack.pop() {
        for entry in repo.read_tree(oid).op("read_tree", oid)? {
            let path = if prefix.is_empty() {
                entry.name
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode.is_tree() {
                stack.push((path, entry.oid));
            } else {
                out.insert(path, (entry.mode, entry.oid));
            }
        }
    }
    Ok(out)
}
